use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;

use super::auth::{AuthenticatedEmail, CurrentUser};
use super::pages::{
    AllPicksTemplate, MatchupGroup, PickLine, PickSheetRow, RegisterTemplate, StandingRow,
    UserPicksTemplate, YearIndexTemplate,
};
use super::{AppError, AppState, HtmlTemplate};
use crate::error::Error;
use crate::models::{BowlMatchup, NewUser, User};
use crate::storage::Storage;
use crate::utils::export::build_export;
use crate::utils::scoring::{matchup_winners, pick_distance, standings};
use crate::utils::submission::{parse_pick_form, submit_picks, FlashMessage};

/// Configured reveal date, or the year's first kickoff
pub fn reveal_time(
    configured: Option<DateTime<Utc>>,
    matchups: &[BowlMatchup],
) -> Option<DateTime<Utc>> {
    configured.or_else(|| matchups.iter().map(|m| m.start_time).min())
}

pub fn picks_revealed(
    configured: Option<DateTime<Utc>>,
    matchups: &[BowlMatchup],
    now: DateTime<Utc>,
) -> bool {
    reveal_time(configured, matchups).map_or(true, |at| now >= at)
}

fn final_score(matchup: &BowlMatchup) -> String {
    match (matchup.away_team_final_score, matchup.home_team_final_score) {
        (Some(away), Some(home)) => format!(
            "{} {}, {} {}",
            matchup.away_team.name, away, matchup.home_team.name, home
        ),
        _ => String::new(),
    }
}

pub async fn year_index(State(state): State<AppState>) -> Result<Response, AppError> {
    let years = state.storage.lock().await.bowl_years()?;

    let template = YearIndexTemplate {
        active_page: "index".to_string(),
        years,
    };
    Ok(HtmlTemplate(template).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub first_name: String,
    pub last_name: String,
}

pub async fn register_form(
    AuthenticatedEmail(email): AuthenticatedEmail,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if state.storage.lock().await.get_user_by_email(&email)?.is_some() {
        return Ok(Redirect::to("/bowl-pool/").into_response());
    }

    let template = RegisterTemplate {
        active_page: "register".to_string(),
        email,
        first_name: String::new(),
        last_name: String::new(),
        error: String::new(),
    };
    Ok(HtmlTemplate(template).into_response())
}

pub async fn register_submit(
    AuthenticatedEmail(email): AuthenticatedEmail,
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let new_user = NewUser {
        email: email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
    };

    let result = state.storage.lock().await.insert_user(&new_user);
    match result {
        Ok(_) => Ok(Redirect::to("/bowl-pool/").into_response()),
        Err(Error::Validation(message)) | Err(Error::Constraint(message)) => {
            let template = RegisterTemplate {
                active_page: "register".to_string(),
                email,
                first_name: form.first_name,
                last_name: form.last_name,
                error: message,
            };
            Ok((StatusCode::BAD_REQUEST, HtmlTemplate(template)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Render the user's pick sheet: every matchup of the year, picked or not
fn render_pick_sheet(
    storage: &Storage,
    user: &User,
    bowl_year: i32,
    now: DateTime<Utc>,
    messages: Vec<FlashMessage>,
) -> Result<Response, AppError> {
    let matchups = storage.matchups_for_year(bowl_year)?;
    let picks = storage.picks_for_user(user.id, bowl_year)?;

    let mut cfp_teams = Vec::new();
    for m in matchups.iter().filter(|m| m.cfp_playoff_game) {
        cfp_teams.push(m.away_team.name.clone());
        cfp_teams.push(m.home_team.name.clone());
    }

    let rows = matchups
        .iter()
        .map(|m| {
            let pick = picks.iter().find(|p| p.bowl_matchup_id == m.id);
            let winner_id = pick.map(|p| p.winner.id);
            PickSheetRow {
                matchup_id: m.id,
                display_name: m.display_name(),
                start_time: m.start_time,
                home_team_point_spread: m.home_team_point_spread,
                favorite: m.bowl_favorite(),
                away_team_id: m.away_team.id,
                away_team: m.away_team.name.clone(),
                home_team_id: m.home_team.id,
                home_team: m.home_team.name.clone(),
                away_selected: winner_id == Some(m.away_team.id),
                home_selected: winner_id == Some(m.home_team.id),
                margin: pick.map(|p| p.margin.to_string()).unwrap_or_default(),
                current_pick: pick.map(|p| p.winner_and_margin()).unwrap_or_default(),
                locked: m.has_started(now),
                final_score: final_score(m),
            }
        })
        .collect();

    let template = UserPicksTemplate {
        active_page: "my_picks".to_string(),
        bowl_year,
        user_name: user.display_name(),
        rows,
        cfp_teams,
        messages,
    };
    Ok(HtmlTemplate(template).into_response())
}

pub async fn my_picks(
    CurrentUser(user): CurrentUser,
    Path(bowl_year): Path<i32>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let storage = state.storage.lock().await;
    render_pick_sheet(&storage, &user, bowl_year, state.now(), Vec::new())
}

pub async fn submit_my_picks(
    CurrentUser(user): CurrentUser,
    Path(bowl_year): Path<i32>,
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let now = state.now();
    let entries = parse_pick_form(&fields);

    let storage = state.storage.lock().await;
    let outcome = submit_picks(&storage, &user, bowl_year, entries, now)?;
    render_pick_sheet(&storage, &user, bowl_year, now, outcome.messages)
}

pub async fn all_picks(
    Path(bowl_year): Path<i32>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let now = state.now();
    let storage = state.storage.lock().await;
    let matchups = storage.matchups_for_year(bowl_year)?;

    let reveal_at = reveal_time(state.config.reveal_at, &matchups);
    let revealed = picks_revealed(state.config.reveal_at, &matchups, now);
    let reveal_at = reveal_at
        .map(|at| at.format("%b %-d, %Y %-I:%M %p UTC").to_string())
        .unwrap_or_default();

    if !revealed {
        info!("Picks for {} requested before reveal", bowl_year);
        let template = AllPicksTemplate {
            active_page: "all_picks".to_string(),
            bowl_year,
            revealed,
            reveal_at,
            groups: Vec::new(),
            standings: Vec::new(),
        };
        return Ok(HtmlTemplate(template).into_response());
    }

    let picks = storage.picks_for_year(bowl_year)?;

    let groups = matchups
        .iter()
        .map(|m| {
            let winners: HashSet<i64> = matchup_winners(m, &picks).iter().map(|p| p.id).collect();
            let mut lines: Vec<_> = picks.iter().filter(|p| p.bowl_matchup_id == m.id).collect();
            lines.sort_by_key(|p| p.user.sort_key());
            MatchupGroup {
                display_name: m.display_name(),
                start_time: m.start_time,
                favorite: m.bowl_favorite(),
                final_score: final_score(m),
                picks: lines
                    .into_iter()
                    .map(|p| PickLine {
                        user_name: p.user.display_name(),
                        winner_and_margin: p.winner_and_margin(),
                        distance: pick_distance(p, m)
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                        is_winner: winners.contains(&p.id),
                    })
                    .collect(),
            }
        })
        .collect();

    let standings = standings(&matchups, &picks)
        .into_iter()
        .enumerate()
        .map(|(i, s)| StandingRow {
            rank: i + 1,
            user_name: s.user.display_name(),
            wins: s.wins,
        })
        .collect();

    let template = AllPicksTemplate {
        active_page: "all_picks".to_string(),
        bowl_year,
        revealed,
        reveal_at,
        groups,
        standings,
    };
    Ok(HtmlTemplate(template).into_response())
}

pub async fn picks_json(
    Path(bowl_year): Path<i32>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let now = state.now();
    let storage = state.storage.lock().await;
    let matchups = storage.matchups_for_year(bowl_year)?;

    if !picks_revealed(state.config.reveal_at, &matchups, now) {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "picks are not revealed yet" })),
        )
            .into_response());
    }

    let picks = storage.picks_for_year(bowl_year)?;
    Ok(Json(build_export(bowl_year, &matchups, &picks)).into_response())
}
