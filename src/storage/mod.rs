//! SQLite-backed storage for users, reference data and picks.

pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{
    validate_margin, validate_scores, BowlGame, BowlMatchup, BowlMatchupPick, NewMatchup, NewUser,
    Team, User,
};

const MATCHUP_SELECT: &str = r"
SELECT m.id, m.bowl_year, m.cfp_playoff_game, m.cfp_championship, m.start_time,
       m.home_team_point_spread, m.away_team_final_score, m.home_team_final_score,
       g.id, g.name,
       a.id, a.name, a.abbreviation,
       h.id, h.name, h.abbreviation
FROM bowl_matchups m
JOIN bowl_games g ON g.id = m.bowl_game_id
JOIN teams a ON a.id = m.away_team_id
JOIN teams h ON h.id = m.home_team_id
";

const PICK_SELECT: &str = r"
SELECT p.id, p.bowl_matchup_id, p.margin,
       u.id, u.email, u.first_name, u.last_name,
       t.id, t.name, t.abbreviation
FROM bowl_matchup_picks p
JOIN users u ON u.id = p.user_id
JOIN teams t ON t.id = p.winner_id
JOIN bowl_matchups m ON m.id = p.bowl_matchup_id
";

/// Whether an upsert created a new pick or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickWrite {
    Inserted(i64),
    Updated(i64),
}

impl PickWrite {
    pub fn id(&self) -> i64 {
        match self {
            PickWrite::Inserted(id) | PickWrite::Updated(id) => *id,
        }
    }
}

#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open (creating if needed) the pool database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a transaction; storage methods called before `commit` run inside it
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // Users

    pub fn insert_user(&self, user: &NewUser) -> Result<i64> {
        let user = user.normalized()?;
        self.conn
            .execute(
                "INSERT INTO users (email, first_name, last_name) VALUES (?1, ?2, ?3)",
                params![user.email, user.first_name, user.last_name],
            )
            .map_err(Error::from_write)?;
        let id = self.conn.last_insert_rowid();
        info!("Registered user {} ({})", user.email, id);
        Ok(id)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, first_name, last_name FROM users WHERE email = ?1",
                [email.trim().to_lowercase()],
                |row| user_from_row(row, 0),
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, first_name, last_name FROM users
             ORDER BY lower(last_name), lower(first_name), email",
        )?;
        let users = stmt
            .query_map([], |row| user_from_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // Teams and bowl games

    pub fn insert_team(&self, name: &str, abbreviation: &str) -> Result<i64> {
        let name = name.trim();
        let abbreviation = abbreviation.trim();
        if name.is_empty() {
            return Err(Error::validation("Team name is required"));
        }
        if abbreviation.chars().count() > 4 {
            return Err(Error::validation(
                "Team abbreviation must be at most 4 characters",
            ));
        }
        self.conn
            .execute(
                "INSERT INTO teams (name, abbreviation) VALUES (?1, ?2)",
                params![name, abbreviation],
            )
            .map_err(Error::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_team_by_name(&self, name: &str) -> Result<Option<Team>> {
        let team = self
            .conn
            .query_row(
                "SELECT id, name, abbreviation FROM teams WHERE name = ?1",
                [name.trim()],
                |row| team_from_row(row, 0),
            )
            .optional()?;
        Ok(team)
    }

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, abbreviation FROM teams ORDER BY name")?;
        let teams = stmt
            .query_map([], |row| team_from_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    pub fn insert_bowl_game(&self, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Bowl game name is required"));
        }
        self.conn
            .execute("INSERT INTO bowl_games (name) VALUES (?1)", [name])
            .map_err(Error::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// First bowl game with this name (names are not unique)
    pub fn find_bowl_game(&self, name: &str) -> Result<Option<BowlGame>> {
        let game = self
            .conn
            .query_row(
                "SELECT id, name FROM bowl_games WHERE name = ?1 ORDER BY id LIMIT 1",
                [name.trim()],
                |row| {
                    Ok(BowlGame {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(game)
    }

    // Matchups

    pub fn insert_matchup(&self, matchup: &NewMatchup) -> Result<i64> {
        matchup.validate()?;
        self.conn
            .execute(
                r"
                INSERT INTO bowl_matchups (
                    bowl_game_id, bowl_year, cfp_playoff_game, cfp_championship, start_time,
                    away_team_id, home_team_id, home_team_point_spread,
                    away_team_final_score, home_team_final_score
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    matchup.bowl_game_id,
                    matchup.bowl_year,
                    matchup.cfp_playoff_game,
                    matchup.cfp_championship,
                    format_timestamp(matchup.start_time),
                    matchup.away_team_id,
                    matchup.home_team_id,
                    matchup.home_team_point_spread,
                    matchup.away_team_final_score,
                    matchup.home_team_final_score,
                ],
            )
            .map_err(Error::from_write)?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted matchup {} for {}", id, matchup.bowl_year);
        Ok(id)
    }

    /// Record (or clear, with `None`) the final score of a matchup
    pub fn set_final_score(&self, matchup_id: i64, away: Option<i32>, home: Option<i32>) -> Result<()> {
        validate_scores(away, home)?;
        let changed = self
            .conn
            .execute(
                "UPDATE bowl_matchups SET away_team_final_score = ?1, home_team_final_score = ?2
                 WHERE id = ?3",
                params![away, home, matchup_id],
            )
            .map_err(Error::from_write)?;
        if changed == 0 {
            return Err(Error::not_found(format!("matchup {}", matchup_id)));
        }
        info!("Set final score for matchup {}: {:?} - {:?}", matchup_id, away, home);
        Ok(())
    }

    pub fn get_matchup(&self, id: i64) -> Result<Option<BowlMatchup>> {
        let sql = format!("{} WHERE m.id = ?1", MATCHUP_SELECT);
        let matchup = self
            .conn
            .query_row(&sql, [id], matchup_from_row)
            .optional()?;
        Ok(matchup)
    }

    /// All matchups of a year, ordered by start time
    pub fn matchups_for_year(&self, bowl_year: i32) -> Result<Vec<BowlMatchup>> {
        let sql = format!(
            "{} WHERE m.bowl_year = ?1 ORDER BY m.start_time, m.id",
            MATCHUP_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let matchups = stmt
            .query_map([bowl_year], matchup_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matchups)
    }

    /// Distinct years that have at least one matchup, ascending
    pub fn bowl_years(&self) -> Result<Vec<i32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT bowl_year FROM bowl_matchups ORDER BY bowl_year")?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i32>, _>>()?;
        Ok(years)
    }

    // Picks

    /// Every user's picks for a year
    pub fn picks_for_year(&self, bowl_year: i32) -> Result<Vec<BowlMatchupPick>> {
        let sql = format!(
            "{} WHERE m.bowl_year = ?1
             ORDER BY m.start_time, lower(u.last_name), lower(u.first_name)",
            PICK_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let picks = stmt
            .query_map([bowl_year], pick_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(picks)
    }

    pub fn picks_for_user(&self, user_id: i64, bowl_year: i32) -> Result<Vec<BowlMatchupPick>> {
        let sql = format!(
            "{} WHERE m.bowl_year = ?1 AND p.user_id = ?2 ORDER BY m.start_time",
            PICK_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let picks = stmt
            .query_map(params![bowl_year, user_id], pick_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(picks)
    }

    pub fn get_pick(&self, user_id: i64, matchup_id: i64) -> Result<Option<BowlMatchupPick>> {
        let sql = format!("{} WHERE p.user_id = ?1 AND p.bowl_matchup_id = ?2", PICK_SELECT);
        let pick = self
            .conn
            .query_row(&sql, params![user_id, matchup_id], pick_from_row)
            .optional()?;
        Ok(pick)
    }

    /// Update the user's pick for the matchup if one exists, otherwise insert it
    pub fn upsert_pick(
        &self,
        user_id: i64,
        matchup_id: i64,
        winner_id: i64,
        margin: i32,
    ) -> Result<PickWrite> {
        validate_margin(margin)?;
        let matchup = self
            .get_matchup(matchup_id)?
            .ok_or_else(|| Error::not_found(format!("matchup {}", matchup_id)))?;
        if !matchup.involves(winner_id) {
            return Err(Error::validation(format!(
                "Winner must be {} or {}",
                matchup.away_team.name, matchup.home_team.name
            )));
        }

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM bowl_matchup_picks WHERE user_id = ?1 AND bowl_matchup_id = ?2",
                params![user_id, matchup_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn
                    .execute(
                        "UPDATE bowl_matchup_picks SET winner_id = ?1, margin = ?2 WHERE id = ?3",
                        params![winner_id, margin, id],
                    )
                    .map_err(Error::from_write)?;
                Ok(PickWrite::Updated(id))
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO bowl_matchup_picks (user_id, bowl_matchup_id, winner_id, margin)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![user_id, matchup_id, winner_id, margin],
                    )
                    .map_err(Error::from_write)?;
                Ok(PickWrite::Inserted(self.conn.last_insert_rowid()))
            }
        }
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(offset)?,
        email: row.get(offset + 1)?,
        first_name: row.get(offset + 2)?,
        last_name: row.get(offset + 3)?,
    })
}

fn team_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        abbreviation: row.get(offset + 2)?,
    })
}

fn matchup_from_row(row: &Row<'_>) -> rusqlite::Result<BowlMatchup> {
    Ok(BowlMatchup {
        id: row.get(0)?,
        bowl_year: row.get(1)?,
        cfp_playoff_game: row.get(2)?,
        cfp_championship: row.get(3)?,
        start_time: parse_timestamp(4, row.get(4)?)?,
        home_team_point_spread: row.get(5)?,
        away_team_final_score: row.get(6)?,
        home_team_final_score: row.get(7)?,
        bowl_game: BowlGame {
            id: row.get(8)?,
            name: row.get(9)?,
        },
        away_team: team_from_row(row, 10)?,
        home_team: team_from_row(row, 13)?,
    })
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<BowlMatchupPick> {
    Ok(BowlMatchupPick {
        id: row.get(0)?,
        bowl_matchup_id: row.get(1)?,
        margin: row.get(2)?,
        user: user_from_row(row, 3)?,
        winner: team_from_row(row, 7)?,
    })
}
