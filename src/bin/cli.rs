use anyhow::{bail, Context, Result};
use bowlpool::export::{load_year_export, save_export_to_json, save_picks_to_csv};
use bowlpool::scoring::{matchup_winners, standings};
use bowlpool::{init_logging, Config, NewMatchup, NewUser, Storage};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Administer the bowl pool: reference data, final scores and exports
#[derive(Parser)]
#[command(name = "cli", version)]
struct Cli {
    /// Database file (defaults to BOWLPOOL_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a pool participant
    AddUser {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    AddTeam {
        #[arg(long)]
        name: String,
        #[arg(long)]
        abbreviation: String,
    },
    AddGame {
        #[arg(long)]
        name: String,
    },
    /// Schedule a bowl game for a season; the bowl game is created if it doesn't exist
    AddMatchup {
        #[arg(long)]
        game: String,
        /// Season year (January games belong to the previous year)
        #[arg(long)]
        year: i32,
        /// Kickoff as RFC 3339, e.g. 2024-01-01T22:00:00Z
        #[arg(long, value_parser = parse_start)]
        start: DateTime<Utc>,
        #[arg(long)]
        away: String,
        #[arg(long)]
        home: String,
        /// Home team's spread; negative means the home team is favored
        #[arg(long, allow_negative_numbers = true)]
        spread: i32,
        #[arg(long)]
        cfp_semifinal: bool,
        #[arg(long)]
        championship: bool,
    },
    /// Record the final score of a matchup
    SetScore {
        #[arg(long)]
        matchup: i64,
        #[arg(long)]
        away: Option<i32>,
        #[arg(long)]
        home: Option<i32>,
        /// Remove a recorded score
        #[arg(long, conflicts_with_all = ["away", "home"])]
        clear: bool,
    },
    /// List registered users by last name
    ListUsers,
    ListTeams,
    ListMatchups {
        #[arg(long)]
        year: i32,
    },
    /// Print the winners of each completed matchup and the standings
    Results {
        #[arg(long)]
        year: i32,
    },
    Export {
        #[arg(long)]
        year: i32,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

fn parse_start(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging();

    let db_path = cli.db.unwrap_or(config.database_path);
    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    match cli.command {
        Command::AddUser {
            email,
            first_name,
            last_name,
        } => {
            let id = storage
                .insert_user(&NewUser {
                    email,
                    first_name,
                    last_name,
                })
                .context("Failed to add user")?;
            println!("Added user {}", id);
        }
        Command::AddTeam { name, abbreviation } => {
            let id = storage
                .insert_team(&name, &abbreviation)
                .context("Failed to add team")?;
            println!("Added team {} ({})", name, id);
        }
        Command::AddGame { name } => {
            let id = storage
                .insert_bowl_game(&name)
                .context("Failed to add bowl game")?;
            println!("Added bowl game {} ({})", name, id);
        }
        Command::AddMatchup {
            game,
            year,
            start,
            away,
            home,
            spread,
            cfp_semifinal,
            championship,
        } => {
            let bowl_game_id = match storage.find_bowl_game(&game)? {
                Some(g) => g.id,
                None => storage.insert_bowl_game(&game)?,
            };
            let Some(away_team) = storage.get_team_by_name(&away)? else {
                bail!("No team named {:?}", away);
            };
            let Some(home_team) = storage.get_team_by_name(&home)? else {
                bail!("No team named {:?}", home);
            };
            let id = storage
                .insert_matchup(&NewMatchup {
                    bowl_game_id,
                    bowl_year: year,
                    cfp_playoff_game: cfp_semifinal,
                    cfp_championship: championship,
                    start_time: start,
                    away_team_id: away_team.id,
                    home_team_id: home_team.id,
                    home_team_point_spread: spread,
                    away_team_final_score: None,
                    home_team_final_score: None,
                })
                .context("Failed to add matchup")?;
            println!("Added matchup {}", id);
        }
        Command::SetScore {
            matchup,
            away,
            home,
            clear,
        } => {
            if !clear && (away.is_none() || home.is_none()) {
                bail!("Pass both --away and --home, or --clear");
            }
            storage
                .set_final_score(matchup, away, home)
                .context("Failed to set score")?;
            if let Some(m) = storage.get_matchup(matchup)? {
                println!("{}", m.format());
            }
        }
        Command::ListUsers => {
            let users = storage.list_users()?;
            if users.is_empty() {
                println!("No users registered.");
            }
            for u in users {
                println!("{:>4}. {} <{}>", u.id, u.display_name(), u.email);
            }
        }
        Command::ListTeams => {
            for t in storage.list_teams()? {
                println!("{:>4}. {} ({})", t.id, t.name, t.abbreviation);
            }
        }
        Command::ListMatchups { year } => {
            let matchups = storage.matchups_for_year(year)?;
            if matchups.is_empty() {
                println!("No matchups for {}.", year);
            }
            for m in matchups {
                println!(
                    "{:>4}. {} | {} | {}",
                    m.id,
                    m.format(),
                    m.start_time.format("%Y-%m-%d %H:%M UTC"),
                    m.bowl_favorite()
                );
            }
        }
        Command::Results { year } => {
            let matchups = storage.matchups_for_year(year)?;
            let picks = storage.picks_for_year(year)?;

            println!("RESULTS FOR {}\n", year);
            for m in matchups.iter().filter(|m| m.is_complete()) {
                let winners: Vec<String> = matchup_winners(m, &picks)
                    .iter()
                    .map(|p| format!("{} ({})", p.user.display_name(), p.winner_and_margin()))
                    .collect();
                if winners.is_empty() {
                    println!("{}: no winner", m.format());
                } else {
                    println!("{}: {}", m.format(), winners.join(", "));
                }
            }

            println!("\nSTANDINGS\n");
            for (i, s) in standings(&matchups, &picks).iter().enumerate() {
                println!("{}. {} - {}", i + 1, s.user.display_name(), s.wins);
            }
        }
        Command::Export {
            year,
            format,
            output,
        } => {
            let export = load_year_export(&storage, year)?;
            match format {
                ExportFormat::Json => save_export_to_json(&export, &output)?,
                ExportFormat::Csv => save_picks_to_csv(&export, &output)?,
            }
            println!("Saved {} picks to {}", year, output.display());
        }
    }

    Ok(())
}
