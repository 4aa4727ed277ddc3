use crate::error::Result;
use crate::models::{BowlMatchup, BowlMatchupPick};
use crate::storage::Storage;
use crate::utils::scoring::{matchup_winners, pick_distance};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// Everything picked for a year, with winners worked out per matchup
#[derive(Debug, Clone, Serialize)]
pub struct YearExport {
    pub bowl_year: i32,
    pub matchups: Vec<MatchupExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchupExport {
    pub id: i64,
    pub bowl_game: String,
    pub display_name: String,
    pub away_team: String,
    pub home_team: String,
    pub start_time: DateTime<Utc>,
    pub home_team_point_spread: i32,
    pub cfp_playoff_game: bool,
    pub cfp_championship: bool,
    pub away_team_final_score: Option<i32>,
    pub home_team_final_score: Option<i32>,
    pub final_margin: Option<i32>,
    pub picks: Vec<PickExport>,
    /// Emails of the users closest to the final margin
    pub winners: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickExport {
    pub user: String,
    pub user_name: String,
    pub winner: String,
    pub margin: i32,
    pub distance: Option<i64>,
    pub is_winner: bool,
}

/// One CSV row per pick
#[derive(Debug, Serialize)]
struct PickRow<'a> {
    bowl_year: i32,
    matchup: &'a str,
    start_time: String,
    final_score: String,
    user: &'a str,
    user_name: &'a str,
    winner: &'a str,
    margin: i32,
    distance: Option<i64>,
    is_winner: bool,
}

pub fn build_export(
    bowl_year: i32,
    matchups: &[BowlMatchup],
    picks: &[BowlMatchupPick],
) -> YearExport {
    let matchups = matchups
        .iter()
        .map(|matchup| {
            let winners: HashSet<i64> = matchup_winners(matchup, picks)
                .into_iter()
                .map(|p| p.id)
                .collect();

            let mut matchup_picks: Vec<&BowlMatchupPick> = picks
                .iter()
                .filter(|p| p.bowl_matchup_id == matchup.id)
                .collect();
            matchup_picks.sort_by_key(|p| p.user.sort_key());

            MatchupExport {
                id: matchup.id,
                bowl_game: matchup.bowl_game.name.clone(),
                display_name: matchup.display_name(),
                away_team: matchup.away_team.name.clone(),
                home_team: matchup.home_team.name.clone(),
                start_time: matchup.start_time,
                home_team_point_spread: matchup.home_team_point_spread,
                cfp_playoff_game: matchup.cfp_playoff_game,
                cfp_championship: matchup.cfp_championship,
                away_team_final_score: matchup.away_team_final_score,
                home_team_final_score: matchup.home_team_final_score,
                final_margin: matchup.final_margin(),
                winners: matchup_picks
                    .iter()
                    .filter(|p| winners.contains(&p.id))
                    .map(|p| p.user.email.clone())
                    .collect(),
                picks: matchup_picks
                    .iter()
                    .map(|p| PickExport {
                        user: p.user.email.clone(),
                        user_name: p.user.display_name(),
                        winner: p.winner.name.clone(),
                        margin: p.margin,
                        distance: pick_distance(p, matchup),
                        is_winner: winners.contains(&p.id),
                    })
                    .collect(),
            }
        })
        .collect();

    YearExport {
        bowl_year,
        matchups,
    }
}

/// Load a year's matchups and picks and build the export
pub fn load_year_export(storage: &Storage, bowl_year: i32) -> Result<YearExport> {
    let matchups = storage.matchups_for_year(bowl_year)?;
    let picks = storage.picks_for_year(bowl_year)?;
    Ok(build_export(bowl_year, &matchups, &picks))
}

/// Save the export as pretty-printed JSON
pub fn save_export_to_json(export: &YearExport, filename: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    std::fs::write(filename.as_ref(), json)
        .map_err(|e| crate::Error::Export(format!("{}: {}", filename.as_ref().display(), e)))?;
    Ok(())
}

/// Write one row per pick to any writer
pub fn write_picks_csv<W: std::io::Write>(export: &YearExport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for matchup in &export.matchups {
        let final_score = match (matchup.away_team_final_score, matchup.home_team_final_score) {
            (Some(away), Some(home)) => format!("{}-{}", away, home),
            _ => String::new(),
        };
        for pick in &matchup.picks {
            wtr.serialize(PickRow {
                bowl_year: export.bowl_year,
                matchup: &matchup.display_name,
                start_time: matchup.start_time.to_rfc3339(),
                final_score: final_score.clone(),
                user: &pick.user,
                user_name: &pick.user_name,
                winner: &pick.winner,
                margin: pick.margin,
                distance: pick.distance,
                is_winner: pick.is_winner,
            })?;
        }
    }
    wtr.flush()
        .map_err(|e| crate::Error::Export(e.to_string()))?;
    Ok(())
}

/// Save picks to a CSV file
pub fn save_picks_to_csv(export: &YearExport, filename: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(filename.as_ref())
        .map_err(|e| crate::Error::Export(format!("{}: {}", filename.as_ref().display(), e)))?;
    write_picks_csv(export, file)
}
