use crate::error::{Error, Result};
use crate::models::{BowlMatchup, User};
use crate::storage::{PickWrite, Storage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashLevel {
    Success,
    Warning,
    Error,
}

/// A message shown to the user after submitting picks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            text: text.into(),
        }
    }

    /// Bootstrap alert class for the message level
    pub fn css_class(&self) -> &'static str {
        match self.level {
            FlashLevel::Success => "success",
            FlashLevel::Warning => "warning",
            FlashLevel::Error => "danger",
        }
    }
}

/// Raw form values submitted for one matchup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickEntry {
    pub matchup_id: i64,
    pub winner: Option<String>,
    pub margin: Option<String>,
}

/// Group `<matchup_id>-winner` / `<matchup_id>-margin` form fields by matchup
/// Anything else in the form is ignored
pub fn parse_pick_form(fields: &[(String, String)]) -> Vec<PickEntry> {
    let mut entries: BTreeMap<i64, PickEntry> = BTreeMap::new();

    for (key, value) in fields {
        let Some((id, kind)) = key.split_once('-') else {
            continue;
        };
        let Ok(matchup_id) = id.parse::<i64>() else {
            continue;
        };
        let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        let entry = entries.entry(matchup_id).or_insert_with(|| PickEntry {
            matchup_id,
            ..Default::default()
        });
        match kind {
            "winner" => entry.winner = value,
            "margin" => entry.margin = value,
            _ => {}
        }
    }

    entries.into_values().collect()
}

#[derive(Debug, Default)]
pub struct SubmissionOutcome {
    pub saved: Vec<PickWrite>,
    pub messages: Vec<FlashMessage>,
}

impl SubmissionOutcome {
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == FlashLevel::Error)
    }
}

/// Check one entry against its matchup, returning the winner id and margin
fn validate_entry(entry: &PickEntry, matchup: &BowlMatchup) -> std::result::Result<(i64, i32), String> {
    let (Some(winner), Some(margin)) = (&entry.winner, &entry.margin) else {
        return Err(format!("Matchup {} not picked", matchup.display_name()));
    };

    let winner: i64 = winner
        .parse()
        .map_err(|_| format!("Invalid winner for {}", matchup.display_name()))?;
    if !matchup.involves(winner) {
        return Err(format!(
            "Winner for {} must be {} or {}",
            matchup.display_name(),
            matchup.away_team.name,
            matchup.home_team.name
        ));
    }

    let margin: i32 = margin
        .parse()
        .map_err(|_| format!("Margin for {} must be a whole number", matchup.display_name()))?;
    if margin < 1 {
        return Err(format!(
            "Must pick a margin of at least 1 for {}",
            matchup.display_name()
        ));
    }

    Ok((winner, margin))
}

/// Save a batch of picks for one user and year in a single transaction
///
/// Each matchup is handled on its own: a rejected pick produces a flash message and the
/// rest of the batch still goes through. Matchups that have already kicked off are never
/// modified. The championship pick is saved last, and only when it names the winner of
/// one of the user's two semifinal picks.
pub fn submit_picks(
    storage: &Storage,
    user: &User,
    bowl_year: i32,
    entries: Vec<PickEntry>,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome> {
    let tx = storage.begin()?;
    let matchups: HashMap<i64, BowlMatchup> = storage
        .matchups_for_year(bowl_year)?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut outcome = SubmissionOutcome::default();
    let mut known = Vec::new();
    for entry in entries {
        match matchups.get(&entry.matchup_id) {
            Some(matchup) => known.push((matchup, entry)),
            None => outcome.messages.push(FlashMessage::error(format!(
                "Unknown matchup {} for {}",
                entry.matchup_id, bowl_year
            ))),
        }
    }
    known.sort_by_key(|(m, _)| (m.start_time, m.id));

    let mut championship = None;
    for (matchup, entry) in known {
        if matchup.has_started(now) {
            warn!(
                "{} tried to change a pick for {} after kickoff",
                user.email,
                matchup.display_name()
            );
            outcome.messages.push(FlashMessage::warning(format!(
                "{} has already started; your pick was not changed",
                matchup.display_name()
            )));
            continue;
        }

        let (winner, margin) = match validate_entry(&entry, matchup) {
            Ok(pick) => pick,
            Err(message) => {
                outcome.messages.push(FlashMessage::error(message));
                continue;
            }
        };

        if matchup.cfp_championship {
            championship = Some((matchup, winner, margin));
            continue;
        }

        save(storage, user, matchup, winner, margin, &mut outcome)?;
    }

    if let Some((matchup, winner, margin)) = championship {
        match check_championship_pick(storage, user, bowl_year, &matchups, winner)? {
            Ok(()) => save(storage, user, matchup, winner, margin, &mut outcome)?,
            Err(message) => outcome.messages.push(FlashMessage::error(message)),
        }
    }

    tx.commit()?;

    if !outcome.saved.is_empty() {
        let count = outcome.saved.len();
        outcome.messages.push(FlashMessage::success(format!(
            "Saved {} pick{}",
            count,
            if count == 1 { "" } else { "s" }
        )));
    }
    info!(
        "{} submitted picks for {}: {} saved, {} messages",
        user.email,
        bowl_year,
        outcome.saved.len(),
        outcome.messages.len()
    );
    Ok(outcome)
}

fn save(
    storage: &Storage,
    user: &User,
    matchup: &BowlMatchup,
    winner: i64,
    margin: i32,
    outcome: &mut SubmissionOutcome,
) -> Result<()> {
    match storage.upsert_pick(user.id, matchup.id, winner, margin) {
        Ok(write) => {
            debug!("{:?} pick for {} by {}", write, matchup.id, user.email);
            outcome.saved.push(write);
            Ok(())
        }
        Err(Error::Validation(message)) | Err(Error::Constraint(message)) => {
            outcome.messages.push(FlashMessage::error(format!(
                "{}: {}",
                matchup.display_name(),
                message
            )));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// The championship winner must be one of the winners of the user's two semifinal picks
///
/// The inner `Err` is a message for the user; storage failures abort the batch.
fn check_championship_pick(
    storage: &Storage,
    user: &User,
    bowl_year: i32,
    matchups: &HashMap<i64, BowlMatchup>,
    winner: i64,
) -> Result<std::result::Result<(), String>> {
    let semifinal_picks: Vec<_> = storage
        .picks_for_user(user.id, bowl_year)?
        .into_iter()
        .filter(|p| {
            matchups
                .get(&p.bowl_matchup_id)
                .is_some_and(|m| m.cfp_playoff_game)
        })
        .collect();

    if semifinal_picks.len() != 2 {
        return Ok(Err(
            "Pick both CFP semifinals before picking the championship".to_string(),
        ));
    }

    if !semifinal_picks.iter().any(|p| p.winner.id == winner) {
        return Ok(Err(format!(
            "Your championship pick must be one of your semifinal winners ({} or {})",
            semifinal_picks[0].winner.name, semifinal_picks[1].winner.name
        )));
    }

    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{kickoff, seed};

    fn form(fields: &[(&str, &str)]) -> Vec<(String, String)> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn entry(matchup_id: i64, winner: i64, margin: i32) -> PickEntry {
        PickEntry {
            matchup_id,
            winner: Some(winner.to_string()),
            margin: Some(margin.to_string()),
        }
    }

    fn before_bowl_season() -> DateTime<Utc> {
        kickoff(12, 1)
    }

    #[test]
    fn test_parse_pick_form() {
        let entries = parse_pick_form(&form(&[
            ("csrfmiddlewaretoken", "abc"),
            ("12-winner", "3"),
            ("12-margin", " 7 "),
            ("4-winner", ""),
            ("4-margin", "3"),
            ("x-winner", "1"),
            ("4-comment", "hi"),
        ]));
        assert_eq!(
            entries,
            vec![
                PickEntry {
                    matchup_id: 4,
                    winner: None,
                    margin: Some("3".to_string()),
                },
                PickEntry {
                    matchup_id: 12,
                    winner: Some("3".to_string()),
                    margin: Some("7".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_submit_inserts_then_updates() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);

        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![entry(s.rose, s.oregon, 7), entry(s.orange, s.georgia, 3)],
            before_bowl_season(),
        )
        .unwrap();
        assert_eq!(outcome.saved.len(), 2);
        assert!(!outcome.has_errors());
        assert_eq!(outcome.messages, vec![FlashMessage::success("Saved 2 picks")]);

        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![entry(s.rose, s.texas, 1)],
            before_bowl_season(),
        )
        .unwrap();
        assert!(matches!(outcome.saved[0], PickWrite::Updated(_)));
        let pick = storage.get_pick(s.alice.id, s.rose).unwrap().unwrap();
        assert_eq!(pick.winner_and_margin(), "Texas by 1");
    }

    #[test]
    fn test_validation_failures_do_not_abort_batch() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);

        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![
                PickEntry {
                    matchup_id: s.championship,
                    winner: None,
                    margin: Some("3".to_string()),
                },
                entry(s.rose, s.oregon, 0),
                entry(s.sugar, s.texas, 4),
                entry(9999, s.oregon, 4),
                entry(s.orange, s.georgia, 4),
            ],
            before_bowl_season(),
        )
        .unwrap();

        assert!(outcome.has_errors());
        assert_eq!(outcome.saved.len(), 1);
        let texts: Vec<&str> = outcome.messages.iter().map(|m| m.text.as_str()).collect();
        assert!(texts.contains(&"Unknown matchup 9999 for 2023"));
        assert!(texts.contains(
            &"Matchup CFP National Championship: Oregon vs Georgia (CFP Championship) not picked"
        ));
        assert!(texts
            .iter()
            .any(|t| t.starts_with("Must pick a margin of at least 1")));
        assert!(texts.iter().any(|t| t.contains("must be Ohio State or Georgia")));
        assert!(storage.get_pick(s.alice.id, s.rose).unwrap().is_none());
        assert!(storage.get_pick(s.alice.id, s.sugar).unwrap().is_none());
        assert!(storage.get_pick(s.alice.id, s.orange).unwrap().is_some());
    }

    #[test]
    fn test_negative_margins_rejected_before_scoring() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);
        storage.upsert_pick(s.bob.id, s.rose, s.texas, 3).unwrap();

        let rose_winner = format!("{}-winner", s.rose);
        let rose_margin = format!("{}-margin", s.rose);
        let sugar_winner = format!("{}-winner", s.sugar);
        let sugar_margin = format!("{}-margin", s.sugar);
        let texas = s.texas.to_string();
        let georgia = s.georgia.to_string();
        let entries = parse_pick_form(&form(&[
            (&rose_winner, &texas),
            (&rose_margin, "-2147483648"),
            (&sugar_winner, &georgia),
            (&sugar_margin, "-3"),
        ]));

        let outcome = submit_picks(&storage, &s.alice, 2023, entries, before_bowl_season()).unwrap();
        assert!(outcome.saved.is_empty());
        let rejected = outcome
            .messages
            .iter()
            .filter(|m| {
                m.level == FlashLevel::Error && m.text.starts_with("Must pick a margin of at least 1")
            })
            .count();
        assert_eq!(rejected, 2);
        assert!(storage.get_pick(s.alice.id, s.rose).unwrap().is_none());
        assert!(storage.get_pick(s.alice.id, s.sugar).unwrap().is_none());

        storage.set_final_score(s.rose, Some(17), Some(20)).unwrap();
        let export = crate::utils::export::load_year_export(&storage, 2023).unwrap();
        let rose = export.matchups.iter().find(|m| m.id == s.rose).unwrap();
        assert_eq!(rose.winners, vec!["bob@example.com".to_string()]);
    }

    #[test]
    fn test_championship_check_propagates_storage_errors() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);
        let matchups: HashMap<i64, BowlMatchup> = storage
            .matchups_for_year(2023)
            .unwrap()
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let tx = storage.begin().unwrap();
        tx.execute("DROP TABLE bowl_matchup_picks", []).unwrap();
        let result = check_championship_pick(&storage, &s.alice, 2023, &matchups, s.oregon);
        assert!(matches!(result, Err(Error::Database(_))));
        drop(tx);

        let result = check_championship_pick(&storage, &s.alice, 2023, &matchups, s.oregon).unwrap();
        assert_eq!(
            result,
            Err("Pick both CFP semifinals before picking the championship".to_string())
        );
    }

    #[test]
    fn test_late_submission_leaves_stored_pick_alone() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);
        storage.upsert_pick(s.alice.id, s.rose, s.oregon, 7).unwrap();

        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![entry(s.rose, s.texas, 21), entry(s.sugar, s.georgia, 3)],
            kickoff(1, 1),
        )
        .unwrap();

        assert_eq!(outcome.saved.len(), 1);
        assert_eq!(outcome.messages[0].level, FlashLevel::Warning);
        let rose = storage.get_pick(s.alice.id, s.rose).unwrap().unwrap();
        assert_eq!(rose.winner_and_margin(), "Oregon by 7");
    }

    #[test]
    fn test_championship_requires_both_semifinals() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);

        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![entry(s.rose, s.oregon, 7), entry(s.championship, s.oregon, 3)],
            before_bowl_season(),
        )
        .unwrap();

        assert_eq!(outcome.saved.len(), 1);
        assert!(outcome
            .messages
            .contains(&FlashMessage::error(
                "Pick both CFP semifinals before picking the championship"
            )));
        assert!(storage
            .get_pick(s.alice.id, s.championship)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_championship_winner_must_come_from_semifinal_picks() {
        let storage = Storage::open_in_memory().unwrap();
        let s = seed(&storage);

        // Georgia loses the Sugar Bowl in this bracket, so it can't win the title
        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![
                entry(s.championship, s.georgia, 3),
                entry(s.rose, s.oregon, 7),
                entry(s.sugar, s.ohio_state, 3),
            ],
            before_bowl_season(),
        )
        .unwrap();
        assert_eq!(outcome.saved.len(), 2);
        assert!(outcome.messages.iter().any(|m| m.level == FlashLevel::Error
            && m.text.starts_with("Your championship pick must be one of your semifinal winners")));
        assert!(storage
            .get_pick(s.alice.id, s.championship)
            .unwrap()
            .is_none());

        // Semifinals already stored; the championship alone is now accepted
        let outcome = submit_picks(
            &storage,
            &s.alice,
            2023,
            vec![entry(s.championship, s.oregon, 10)],
            before_bowl_season(),
        )
        .unwrap();
        assert_eq!(outcome.saved.len(), 1);
        assert!(!outcome.has_errors());
    }
}
