// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing commands: weekly status, yearly settlement, jokers, enrollment.
//!
//! Reports evaluate athletes independently. One athlete's failure (revoked
//! token, invalid rules, ...) is reported in that athlete's row and never
//! aborts the report for everyone else.

use chrono::NaiveDate;
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::db::AthleteStore;
use crate::error::AppError;
use crate::models::{AthleteRecord, ChallengeWeek, RuleSet, StravaTokens, Verdict};
use crate::services::activity::ActivitySource;
use crate::services::settlement::{
    multiplier_for_week, score_and_record, settle, FetchStats, WeekCharge,
};
use crate::services::strava::TokenExchangeResponse;
use crate::services::week_cache::WeekResultCache;
use crate::time_utils::{last_elapsed_week, parse_challenge_week, DateRange, MAX_WEEK};

/// Athletes evaluated concurrently in one report.
const MAX_CONCURRENT_ATHLETES: usize = 8;

// ─── Weekly Status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyStatusRow {
    pub athlete_id: u64,
    pub name: String,
    pub points: u32,
    pub points_required: u32,
    pub verdict: Option<Verdict>,
    /// Penalty if the week was failed
    pub amount: f64,
    pub joker: bool,
    /// 1-based, ties share a placement
    pub placement: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyStatusReport {
    pub year: i32,
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub athletes: Vec<WeeklyStatusRow>,
    pub requests: FetchStats,
}

struct WeekEvaluation {
    points: u32,
    verdict: Verdict,
    amount: f64,
    requests: FetchStats,
}

async fn evaluate_week<S: ActivitySource>(
    source: &S,
    cache: &WeekResultCache,
    athlete: &AthleteRecord,
    week: ChallengeWeek,
) -> Result<WeekEvaluation, AppError> {
    athlete.rules.check()?;

    let mut requests = FetchStats::default();
    let range = DateRange::covering(&[week])
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Empty week range")))?;
    let fetched = source.fetch_activities(athlete, range, true).await?;
    requests.add(&fetched);

    let (points, verdict) = score_and_record(cache, athlete, week, &fetched.activities).await?;

    let amount = if verdict == Verdict::Failed {
        let (multiplier, backfill) = multiplier_for_week(source, cache, athlete, week).await?;
        requests.merge(backfill);
        athlete.rules.price_per_missed_week * multiplier
    } else {
        0.0
    };

    Ok(WeekEvaluation {
        points,
        verdict,
        amount,
        requests,
    })
}

/// Score one fully elapsed week for every athlete.
pub async fn weekly_status<S: ActivitySource>(
    source: &S,
    store: &AthleteStore,
    year: i32,
    week_number: u32,
    today: NaiveDate,
) -> Result<WeeklyStatusReport, AppError> {
    let week = parse_challenge_week(year, week_number, today)?;

    let athletes = store.list_athletes().await?;
    if athletes.is_empty() {
        return Err(AppError::NotFound("No athletes enrolled".to_string()));
    }

    tracing::info!(week = %week, athletes = athletes.len(), "Weekly status requested");

    let cache = WeekResultCache::new(store.clone());
    let cache = &cache;
    let results: Vec<(AthleteRecord, Result<WeekEvaluation, AppError>)> =
        stream::iter(athletes)
            .map(|athlete| async move {
                let result = evaluate_week(source, cache, &athlete, week).await;
                (athlete, result)
            })
            .buffer_unordered(MAX_CONCURRENT_ATHLETES)
            .collect()
            .await;

    let mut requests = FetchStats::default();
    let mut rows: Vec<WeeklyStatusRow> = results
        .into_iter()
        .map(|(athlete, result)| {
            let mut row = WeeklyStatusRow {
                athlete_id: athlete.athlete_id,
                name: athlete.display_name(),
                points: 0,
                points_required: athlete.rules.points_required,
                verdict: None,
                amount: 0.0,
                joker: athlete.is_joker_week(week.week),
                placement: None,
                error: None,
            };
            match result {
                Ok(evaluation) => {
                    requests.merge(evaluation.requests);
                    row.points = evaluation.points;
                    row.verdict = Some(evaluation.verdict);
                    row.amount = evaluation.amount;
                }
                Err(e) => {
                    tracing::warn!(
                        athlete_id = athlete.athlete_id,
                        week = %week,
                        error = %e,
                        "Weekly evaluation failed"
                    );
                    row.error = Some(e.to_string());
                }
            }
            row
        })
        .collect();

    assign_placements(&mut rows);

    Ok(WeeklyStatusReport {
        year: week.year,
        week: week.week,
        start: week.first_day(),
        end: week.last_day(),
        athletes: rows,
        requests,
    })
}

/// Sort by points (descending) and place athletes, ties sharing a placement.
/// Rows with errors go last without a placement.
fn assign_placements(rows: &mut [WeeklyStatusRow]) {
    rows.sort_by(|a, b| {
        a.error
            .is_some()
            .cmp(&b.error.is_some())
            .then(b.points.cmp(&a.points))
            .then(a.athlete_id.cmp(&b.athlete_id))
    });

    let mut previous: Option<u32> = None;
    let mut placement = 0;
    for (idx, row) in rows.iter_mut().enumerate() {
        if row.error.is_some() {
            continue;
        }
        if previous != Some(row.points) {
            placement = idx + 1;
            previous = Some(row.points);
        }
        row.placement = Some(placement);
    }
}

// ─── Yearly Settlement ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SettlementRow {
    pub athlete_id: u64,
    pub name: String,
    pub owed: f64,
    /// Owes the most this season
    pub top_payer: bool,
    pub weeks: Vec<WeekCharge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub year: i32,
    pub through_week: u32,
    pub athletes: Vec<SettlementRow>,
    pub scored_weeks: usize,
    pub cached_weeks: usize,
    pub requests: FetchStats,
}

/// Settle the season through the last fully elapsed week for every athlete.
pub async fn yearly_settlement<S: ActivitySource>(
    source: &S,
    store: &AthleteStore,
    year: i32,
    today: NaiveDate,
) -> Result<SettlementReport, AppError> {
    let last_week = last_elapsed_week(year, today).ok_or_else(|| {
        AppError::InvalidWeek(format!("No week of {} has finished yet", year))
    })?;

    let athletes = store.list_athletes().await?;
    if athletes.is_empty() {
        return Err(AppError::NotFound("No athletes enrolled".to_string()));
    }

    tracing::info!(
        year,
        through_week = last_week.week,
        athletes = athletes.len(),
        "Yearly settlement requested"
    );

    let cache = WeekResultCache::new(store.clone());
    let cache = &cache;
    let results: Vec<_> = stream::iter(athletes)
        .map(|athlete| async move {
            let result = settle(source, cache, &athlete, last_week).await;
            (athlete, result)
        })
        .buffer_unordered(MAX_CONCURRENT_ATHLETES)
        .collect()
        .await;

    let mut report = SettlementReport {
        year,
        through_week: last_week.week,
        athletes: Vec::with_capacity(results.len()),
        scored_weeks: 0,
        cached_weeks: 0,
        requests: FetchStats::default(),
    };

    for (athlete, result) in results {
        let mut row = SettlementRow {
            athlete_id: athlete.athlete_id,
            name: athlete.display_name(),
            owed: 0.0,
            top_payer: false,
            weeks: Vec::new(),
            error: None,
        };
        match result {
            Ok(settlement) => {
                report.scored_weeks += settlement.scored_weeks;
                report.cached_weeks += settlement.cached_weeks;
                report.requests.merge(settlement.requests);
                row.owed = settlement.owed;
                row.weeks = settlement.weeks;
            }
            Err(e) => {
                tracing::warn!(
                    athlete_id = athlete.athlete_id,
                    error = %e,
                    "Settlement failed"
                );
                row.error = Some(e.to_string());
            }
        }
        report.athletes.push(row);
    }

    report.athletes.sort_by(|a, b| {
        a.error
            .is_some()
            .cmp(&b.error.is_some())
            .then(b.owed.total_cmp(&a.owed))
            .then(a.athlete_id.cmp(&b.athlete_id))
    });
    let max_owed = report
        .athletes
        .iter()
        .filter(|row| row.error.is_none())
        .map(|row| row.owed)
        .fold(0.0, f64::max);
    for row in report.athletes.iter_mut() {
        row.top_payer = row.error.is_none() && max_owed > 0.0 && row.owed == max_owed;
    }

    Ok(report)
}

// ─── Jokers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JokerAction {
    Applied,
    Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JokerOutcome {
    pub week: u32,
    pub action: JokerAction,
    pub jokers_remaining: u32,
    pub joker_weeks: Vec<u32>,
}

/// Apply or remove a joker for `week`.
///
/// Removing refunds the joker. Either way the cached verdict for the week is
/// dropped in the same write so the week is rescored.
pub async fn toggle_joker(
    store: &AthleteStore,
    athlete_id: u64,
    week: u32,
) -> Result<JokerOutcome, AppError> {
    if !(1..=MAX_WEEK).contains(&week) {
        return Err(AppError::InvalidWeek(format!(
            "Week must be between 1 and {}, got {}",
            MAX_WEEK, week
        )));
    }

    let outcome = store
        .update_athlete(athlete_id, move |athlete| {
            let action = if athlete.is_joker_week(week) {
                athlete.joker_weeks.retain(|w| *w != week);
                athlete.jokers_remaining += 1;
                JokerAction::Removed
            } else if athlete.jokers_remaining == 0 {
                let used: Vec<String> = athlete.joker_weeks.iter().map(u32::to_string).collect();
                return Err(AppError::BadRequest(format!(
                    "No jokers left, already used in week(s) {}",
                    used.join(", ")
                )));
            } else {
                athlete.joker_weeks.push(week);
                athlete.joker_weeks.sort_unstable();
                athlete.jokers_remaining -= 1;
                JokerAction::Applied
            };
            athlete.remove_verdict(week);

            Ok(JokerOutcome {
                week,
                action,
                jokers_remaining: athlete.jokers_remaining,
                joker_weeks: athlete.joker_weeks.clone(),
            })
        })
        .await?;

    tracing::info!(
        athlete_id,
        week,
        action = ?outcome.action,
        jokers_remaining = outcome.jokers_remaining,
        "Joker toggled"
    );

    Ok(outcome)
}

// ─── Result Reset ────────────────────────────────────────────────────────────

/// Which cached verdicts an admin reset drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Everyone,
    Athlete(u64),
    AthleteWeek(u64, u32),
}

/// Drop cached verdicts. Returns how many athletes or verdicts were affected.
pub async fn clear_week_results(store: &AthleteStore, scope: ClearScope) -> Result<usize, AppError> {
    let cache = WeekResultCache::new(store.clone());
    match scope {
        ClearScope::Everyone => cache.clear_everyone().await,
        ClearScope::Athlete(athlete_id) => cache.clear_all(athlete_id).await,
        ClearScope::AthleteWeek(athlete_id, week) => {
            Ok(usize::from(cache.clear_week(athlete_id, week).await?))
        }
    }
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

/// Enroll (or re-authorize) the athlete behind an OAuth token exchange.
///
/// A new athlete gets a snapshot of `default_rules` and its joker allowance.
/// A returning athlete only gets fresh tokens and profile data, written in
/// one atomic update; rules, jokers and verdicts are kept.
pub async fn enroll_athlete(
    store: &AthleteStore,
    exchange: TokenExchangeResponse,
    default_rules: &RuleSet,
    chat_user_id: Option<String>,
) -> Result<AthleteRecord, AppError> {
    let athlete_id = exchange.athlete.id;

    if let Some(chat_user_id) = chat_user_id.as_deref() {
        if let Some(linked) = store.find_by_chat_user(chat_user_id).await? {
            if linked.athlete_id != athlete_id {
                return Err(AppError::Forbidden(format!(
                    "Chat user {} is already linked to another athlete",
                    chat_user_id
                )));
            }
        }
    }

    let tokens = StravaTokens {
        access_token: exchange.access_token,
        refresh_token: exchange.refresh_token,
        expires_at: exchange.expires_at,
    };
    let profile = exchange.athlete;

    let reauthorize = |record: &mut AthleteRecord| -> Result<AthleteRecord, AppError> {
        record.firstname = profile.firstname.clone();
        record.lastname = profile.lastname.clone();
        record.profile_picture = profile.profile.clone();
        record.tokens = tokens.clone();
        if let Some(chat_user_id) = &chat_user_id {
            record.chat_user_id = Some(chat_user_id.clone());
        }
        Ok(record.clone())
    };

    match store.update_athlete(athlete_id, reauthorize).await {
        Ok(record) => {
            tracing::info!(athlete_id, "Athlete re-authorized");
            return Ok(record);
        }
        Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    default_rules.check()?;
    let record = AthleteRecord {
        athlete_id,
        firstname: profile.firstname.clone(),
        lastname: profile.lastname.clone(),
        profile_picture: profile.profile.clone(),
        chat_user_id: chat_user_id.clone(),
        tokens: tokens.clone(),
        rules: default_rules.clone(),
        jokers_remaining: default_rules.jokers,
        joker_weeks: Vec::new(),
        week_results: Vec::new(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    if store.create_athlete(&record).await? {
        tracing::info!(athlete_id, "Athlete enrolled");
        return Ok(record);
    }

    // Another callback enrolled the same athlete first
    let record = store.update_athlete(athlete_id, reauthorize).await?;
    tracing::info!(athlete_id, "Athlete re-authorized after concurrent enrollment");
    Ok(record)
}
