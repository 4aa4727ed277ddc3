//! SQLite schema for the bowl pool database.

use rusqlite::Connection;

use crate::error::Result;

/// Stored in `PRAGMA user_version` once the schema is created.
pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT ''
)
";

pub const CREATE_TEAMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    abbreviation TEXT NOT NULL CHECK (length(abbreviation) <= 4)
)
";

pub const CREATE_BOWL_GAMES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS bowl_games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
)
";

/// Scores are both set or both null.
pub const CREATE_BOWL_MATCHUPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS bowl_matchups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bowl_game_id INTEGER NOT NULL REFERENCES bowl_games(id) ON DELETE CASCADE,
    bowl_year INTEGER NOT NULL,
    cfp_playoff_game INTEGER NOT NULL DEFAULT 0,
    cfp_championship INTEGER NOT NULL DEFAULT 0,
    start_time TEXT NOT NULL,
    away_team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    home_team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    home_team_point_spread INTEGER NOT NULL,
    away_team_final_score INTEGER,
    home_team_final_score INTEGER,
    UNIQUE (bowl_year, bowl_game_id),
    CHECK (away_team_id != home_team_id),
    CHECK ((away_team_final_score IS NULL) = (home_team_final_score IS NULL))
)
";

pub const CREATE_MATCHUP_YEAR_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_bowl_matchups_year ON bowl_matchups(bowl_year, start_time)
";

/// At most one championship matchup per year.
pub const CREATE_CHAMPIONSHIP_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_bowl_matchups_championship
    ON bowl_matchups(bowl_year) WHERE cfp_championship = 1
";

pub const CREATE_PICKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS bowl_matchup_picks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    bowl_matchup_id INTEGER NOT NULL REFERENCES bowl_matchups(id) ON DELETE CASCADE,
    winner_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    margin INTEGER NOT NULL CHECK (margin > 0),
    UNIQUE (user_id, bowl_matchup_id)
)
";

pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_TEAMS_TABLE,
    CREATE_BOWL_GAMES_TABLE,
    CREATE_BOWL_MATCHUPS_TABLE,
    CREATE_MATCHUP_YEAR_INDEX,
    CREATE_CHAMPIONSHIP_INDEX,
    CREATE_PICKS_TABLE,
];

/// Create any missing tables and indexes, then stamp the schema version
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
