use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A pool participant, identified by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }

    /// Key used to order users in pick listings (last name, then first name)
    pub fn sort_key(&self) -> String {
        format!("{}{}", self.last_name, self.first_name).to_lowercase()
    }
}

/// Fields for registering a new user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Trims the fields and lowercases the email
    pub fn normalized(&self) -> Result<NewUser> {
        let email = self.email.trim().to_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(Error::validation("Users require a valid email address")),
        }
        Ok(NewUser {
            email,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlGame {
    pub id: i64,
    pub name: String,
}

/// One bowl game played in a given season
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BowlMatchup {
    pub id: i64,
    pub bowl_game: BowlGame,
    /// Season year; January games belong to the previous year
    pub bowl_year: i32,
    /// CFP semifinal feeding the championship matchup
    pub cfp_playoff_game: bool,
    pub cfp_championship: bool,
    pub start_time: DateTime<Utc>,
    pub away_team: Team,
    pub home_team: Team,
    /// Negative means the home team is favored, positive the away team
    pub home_team_point_spread: i32,
    pub away_team_final_score: Option<i32>,
    pub home_team_final_score: Option<i32>,
}

impl BowlMatchup {
    pub fn bowl_favorite(&self) -> String {
        match self.home_team_point_spread {
            0 => "Pick 'em".to_string(),
            s if s < 0 => format!("{} by {}", self.home_team.name, s.abs()),
            s => format!("{} by {}", self.away_team.name, s),
        }
    }

    /// Away score minus home score, once both scores are in
    pub fn final_margin(&self) -> Option<i32> {
        match (self.away_team_final_score, self.home_team_final_score) {
            (Some(away), Some(home)) => Some(away - home),
            _ => None,
        }
    }

    /// The team that won, or `None` while the game is incomplete or tied
    pub fn winning_team(&self) -> Option<&Team> {
        match self.final_margin()? {
            m if m > 0 => Some(&self.away_team),
            m if m < 0 => Some(&self.home_team),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.final_margin().is_some()
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn involves(&self, team_id: i64) -> bool {
        self.home_team.id == team_id || self.away_team.id == team_id
    }

    pub fn display_name(&self) -> String {
        let mut name = format!(
            "{}: {} vs {}",
            self.bowl_game.name, self.away_team.name, self.home_team.name
        );
        if self.cfp_playoff_game {
            name.push_str(" (CFP Semifinal)");
        }
        if self.cfp_championship {
            name.push_str(" (CFP Championship)");
        }
        name
    }

    pub fn format(&self) -> String {
        let score = match (self.away_team_final_score, self.home_team_final_score) {
            (Some(away), Some(home)) => format!(" ({} - {})", away, home),
            _ => String::new(),
        };
        format!("[{}] {}{}", self.bowl_year, self.display_name(), score)
    }
}

/// Fields for creating a matchup
#[derive(Debug, Clone)]
pub struct NewMatchup {
    pub bowl_game_id: i64,
    pub bowl_year: i32,
    pub cfp_playoff_game: bool,
    pub cfp_championship: bool,
    pub start_time: DateTime<Utc>,
    pub away_team_id: i64,
    pub home_team_id: i64,
    pub home_team_point_spread: i32,
    pub away_team_final_score: Option<i32>,
    pub home_team_final_score: Option<i32>,
}

impl NewMatchup {
    pub fn validate(&self) -> Result<()> {
        if self.away_team_id == self.home_team_id {
            return Err(Error::validation("A team cannot play itself"));
        }
        if self.cfp_playoff_game && self.cfp_championship {
            return Err(Error::validation(
                "A matchup cannot be both a semifinal and the championship",
            ));
        }
        validate_scores(self.away_team_final_score, self.home_team_final_score)
    }
}

/// Scores must be set for both teams or neither one
pub fn validate_scores(away: Option<i32>, home: Option<i32>) -> Result<()> {
    if away.is_some() != home.is_some() {
        return Err(Error::validation(
            "Score must be set for both teams or neither one",
        ));
    }
    if away.is_some_and(|s| s < 0) || home.is_some_and(|s| s < 0) {
        return Err(Error::validation("Scores cannot be negative"));
    }
    Ok(())
}

/// A user's predicted winner and margin for one matchup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BowlMatchupPick {
    pub id: i64,
    pub user: User,
    pub bowl_matchup_id: i64,
    pub winner: Team,
    pub margin: i32,
}

impl BowlMatchupPick {
    pub fn winner_and_margin(&self) -> String {
        format!("{} by {}", self.winner.name, self.margin)
    }
}

/// Margins count points in the picked winner's favor, so they must be positive
pub fn validate_margin(margin: i32) -> Result<()> {
    if margin < 1 {
        return Err(Error::validation("Must pick a margin of at least 1"));
    }
    Ok(())
}
