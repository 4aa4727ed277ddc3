use askama::Template;
use chrono::{DateTime, Utc};

use crate::utils::submission::FlashMessage;

// Custom filters for formatting
mod filters {
    use chrono::{DateTime, Utc};

    pub fn kickoff(ts: &DateTime<Utc>) -> ::askama::Result<String> {
        Ok(ts.format("%a %b %-d, %Y %-I:%M %p UTC").to_string())
    }

    pub fn format_spread(value: &i32) -> ::askama::Result<String> {
        if *value == 0 {
            Ok("PK".to_string())
        } else {
            Ok(format!("{:+}", value))
        }
    }
}

#[derive(Template)]
#[template(path = "year_index.html")]
pub struct YearIndexTemplate {
    pub active_page: String,
    pub years: Vec<i32>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub active_page: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub error: String,
}

/// One matchup on the user's own pick sheet
pub struct PickSheetRow {
    pub matchup_id: i64,
    pub display_name: String,
    pub start_time: DateTime<Utc>,
    pub home_team_point_spread: i32,
    pub favorite: String,
    pub away_team_id: i64,
    pub away_team: String,
    pub home_team_id: i64,
    pub home_team: String,
    pub away_selected: bool,
    pub home_selected: bool,
    /// Empty when there is no pick yet
    pub margin: String,
    pub current_pick: String,
    pub locked: bool,
    pub final_score: String,
}

#[derive(Template)]
#[template(path = "user_picks_for_year.html")]
pub struct UserPicksTemplate {
    pub active_page: String,
    pub bowl_year: i32,
    pub user_name: String,
    pub rows: Vec<PickSheetRow>,
    pub cfp_teams: Vec<String>,
    pub messages: Vec<FlashMessage>,
}

pub struct PickLine {
    pub user_name: String,
    pub winner_and_margin: String,
    pub distance: String,
    pub is_winner: bool,
}

pub struct MatchupGroup {
    pub display_name: String,
    pub start_time: DateTime<Utc>,
    pub favorite: String,
    pub final_score: String,
    pub picks: Vec<PickLine>,
}

pub struct StandingRow {
    pub rank: usize,
    pub user_name: String,
    pub wins: usize,
}

#[derive(Template)]
#[template(path = "all_picks_for_year.html")]
pub struct AllPicksTemplate {
    pub active_page: String,
    pub bowl_year: i32,
    pub revealed: bool,
    pub reveal_at: String,
    pub groups: Vec<MatchupGroup>,
    pub standings: Vec<StandingRow>,
}
