use crate::models::{BowlMatchup, BowlMatchupPick, User};
use serde::Serialize;
use std::collections::HashMap;

/// Convert a pick's margin to the away-minus-home convention used by `final_margin`
/// Picking the away team by 7 is +7, picking the home team by 7 is -7
pub fn normalized_margin(pick: &BowlMatchupPick, matchup: &BowlMatchup) -> i64 {
    let margin = i64::from(pick.margin);
    if pick.winner.id == matchup.away_team.id {
        margin
    } else {
        -margin
    }
}

/// How far a pick landed from the final margin
/// `None` when the game is incomplete or the pick named the losing team
pub fn pick_distance(pick: &BowlMatchupPick, matchup: &BowlMatchup) -> Option<i64> {
    let actual = matchup.final_margin()?;
    let winner = matchup.winning_team()?;
    if pick.winner.id != winner.id {
        return None;
    }
    Some((normalized_margin(pick, matchup) - i64::from(actual)).abs())
}

/// Picks closest to the final margin among those that named the winning team
/// Ties share the win; picks for other matchups are ignored
pub fn matchup_winners<'a>(
    matchup: &BowlMatchup,
    picks: &'a [BowlMatchupPick],
) -> Vec<&'a BowlMatchupPick> {
    let scored: Vec<(&BowlMatchupPick, i64)> = picks
        .iter()
        .filter(|p| p.bowl_matchup_id == matchup.id)
        .filter_map(|p| pick_distance(p, matchup).map(|d| (p, d)))
        .collect();

    let Some(best) = scored.iter().map(|(_, d)| *d).min() else {
        return Vec::new();
    };

    scored
        .into_iter()
        .filter(|(_, d)| *d == best)
        .map(|(p, _)| p)
        .collect()
}

/// Number of matchups a user has won (or shared) in a year
#[derive(Debug, Clone, Serialize)]
pub struct Standing {
    pub user: User,
    pub wins: usize,
}

/// Win counts for every user with at least one pick, most wins first
pub fn standings(matchups: &[BowlMatchup], picks: &[BowlMatchupPick]) -> Vec<Standing> {
    let mut table: HashMap<i64, Standing> = HashMap::new();
    for pick in picks {
        table.entry(pick.user.id).or_insert_with(|| Standing {
            user: pick.user.clone(),
            wins: 0,
        });
    }

    for matchup in matchups.iter().filter(|m| m.is_complete()) {
        for winner in matchup_winners(matchup, picks) {
            if let Some(standing) = table.get_mut(&winner.user.id) {
                standing.wins += 1;
            }
        }
    }

    let mut standings: Vec<Standing> = table.into_values().collect();
    standings.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| a.user.sort_key().cmp(&b.user.sort_key()))
    });
    standings
}
