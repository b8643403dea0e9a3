// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Multi-week settlement: turns a run of verdicts into an amount owed.
//!
//! The penalty for a failed week is `price * base^n` where `n` counts the
//! failed weeks since the last passed one. Joker weeks neither count nor
//! reset. Weeks without a cached verdict are scored first from one shared
//! activity fetch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AppError;
use crate::models::{Activity, AthleteRecord, ChallengeWeek, Verdict};
use crate::services::activity::{ActivitySource, FetchedActivities};
use crate::services::scoring::{score_week, verdict_for, CreditLedger};
use crate::services::week_cache::WeekResultCache;
use crate::time_utils::DateRange;

/// Request accounting across one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub live_requests: u32,
    pub cached_requests: u32,
}

impl FetchStats {
    pub fn add(&mut self, fetched: &FetchedActivities) {
        self.live_requests += fetched.live_requests;
        self.cached_requests += fetched.cached_requests;
    }

    pub fn merge(&mut self, other: FetchStats) {
        self.live_requests += other.live_requests;
        self.cached_requests += other.cached_requests;
    }
}

/// One week's contribution to a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeekCharge {
    pub week: u32,
    pub verdict: Verdict,
    pub amount: f64,
}

/// Result of settling an athlete's season so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub athlete_id: u64,
    pub owed: f64,
    pub weeks: Vec<WeekCharge>,
    /// Weeks scored from fetched activities during this evaluation
    pub scored_weeks: usize,
    /// Weeks answered from the verdict cache
    pub cached_weeks: usize,
    pub requests: FetchStats,
}

/// Outcome of scoring previously unresolved weeks.
#[derive(Debug, Clone, Default)]
pub struct Backfill {
    pub verdicts: BTreeMap<u32, Verdict>,
    pub requests: FetchStats,
}

/// Score one week from already fetched activities and cache the verdict.
pub async fn score_and_record(
    cache: &WeekResultCache,
    athlete: &AthleteRecord,
    week: ChallengeWeek,
    activities: &[Activity],
) -> Result<(u32, Verdict), AppError> {
    let mut ledger = CreditLedger::new();
    let score = score_week(activities, &athlete.rules, week, &mut ledger);
    let verdict = verdict_for(
        score.points(),
        &athlete.rules,
        athlete.is_joker_week(week.week),
    );

    cache.put(athlete.athlete_id, week.week, verdict).await?;

    tracing::info!(
        athlete_id = athlete.athlete_id,
        week = %week,
        points = score.points(),
        interval_points = score.interval_points,
        duration_points = score.duration_points,
        ?verdict,
        "Week scored"
    );

    Ok((score.points(), verdict))
}

/// Ensure every week in `weeks` has a verdict.
///
/// Joker weeks are recorded as `Exempt` directly. All other missing weeks
/// share a single live fetch covering `[first_day(earliest), last_day(latest) + 1)`.
/// If the fetch fails nothing is written.
pub async fn backfill_missing_weeks<S: ActivitySource>(
    source: &S,
    cache: &WeekResultCache,
    athlete: &AthleteRecord,
    weeks: &[ChallengeWeek],
) -> Result<Backfill, AppError> {
    let mut backfill = Backfill::default();

    let missing: Vec<ChallengeWeek> = weeks
        .iter()
        .copied()
        .filter(|w| athlete.verdict(w.week).is_none())
        .collect();
    if missing.is_empty() {
        return Ok(backfill);
    }

    let (jokers, to_score): (Vec<ChallengeWeek>, Vec<ChallengeWeek>) = missing
        .into_iter()
        .partition(|w| athlete.is_joker_week(w.week));

    let activities = match DateRange::covering(&to_score) {
        Some(range) => {
            tracing::info!(
                athlete_id = athlete.athlete_id,
                weeks = to_score.len(),
                start = %range.start,
                end = %range.end,
                "Backfilling missing weeks"
            );
            let fetched = source.fetch_activities(athlete, range, false).await?;
            backfill.requests.add(&fetched);
            fetched.activities
        }
        None => Vec::new(),
    };

    for week in jokers {
        cache.put(athlete.athlete_id, week.week, Verdict::Exempt).await?;
        backfill.verdicts.insert(week.week, Verdict::Exempt);
    }

    for week in to_score {
        let (_, verdict) = score_and_record(cache, athlete, week, &activities).await?;
        backfill.verdicts.insert(week.week, verdict);
    }

    Ok(backfill)
}

/// Weeks `[start_week, last]` of `last.year` that exist.
fn season_weeks(start_week: u32, last: ChallengeWeek) -> Vec<ChallengeWeek> {
    (start_week..=last.week)
        .filter_map(|week| ChallengeWeek::new(last.year, week))
        .collect()
}

/// Settle an athlete's season from `start_week` through `last_week`.
pub async fn settle<S: ActivitySource>(
    source: &S,
    cache: &WeekResultCache,
    athlete: &AthleteRecord,
    last_week: ChallengeWeek,
) -> Result<Settlement, AppError> {
    let rules = &athlete.rules;
    rules.check()?;

    let weeks = season_weeks(rules.start_week, last_week);
    let backfill = backfill_missing_weeks(source, cache, athlete, &weeks).await?;

    let mut settlement = Settlement {
        athlete_id: athlete.athlete_id,
        owed: 0.0,
        weeks: Vec::with_capacity(weeks.len()),
        scored_weeks: backfill.verdicts.len(),
        cached_weeks: weeks.len() - backfill.verdicts.len(),
        requests: backfill.requests,
    };

    let mut exponent = 0;
    for week in &weeks {
        let verdict = backfill
            .verdicts
            .get(&week.week)
            .copied()
            .or_else(|| athlete.verdict(week.week))
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("No verdict for {} after backfill", week))
            })?;

        let amount = match verdict {
            Verdict::Exempt => 0.0,
            Verdict::Passed => {
                exponent = 0;
                0.0
            }
            Verdict::Failed => {
                let amount = rules.price_per_missed_week * rules.multiplier(exponent);
                exponent += 1;
                amount
            }
        };

        settlement.owed += amount;
        settlement.weeks.push(WeekCharge {
            week: week.week,
            verdict,
            amount,
        });
    }

    tracing::info!(
        athlete_id = athlete.athlete_id,
        owed = settlement.owed,
        scored_weeks = settlement.scored_weeks,
        cached_weeks = settlement.cached_weeks,
        "Settlement computed"
    );

    Ok(settlement)
}

/// Penalty multiplier that applies if `week` is failed.
///
/// Counts failed weeks walking backwards from `week - 1`, skipping joker
/// weeks, until the first passed week. Earlier weeks without a verdict are
/// backfilled first.
pub async fn multiplier_for_week<S: ActivitySource>(
    source: &S,
    cache: &WeekResultCache,
    athlete: &AthleteRecord,
    week: ChallengeWeek,
) -> Result<(f64, FetchStats), AppError> {
    let rules = &athlete.rules;
    if !rules.multiplier_enabled || week.week <= rules.start_week {
        return Ok((1.0, FetchStats::default()));
    }

    let Some(previous) = ChallengeWeek::new(week.year, week.week - 1) else {
        return Ok((1.0, FetchStats::default()));
    };
    let history = season_weeks(rules.start_week, previous);
    let backfill = backfill_missing_weeks(source, cache, athlete, &history).await?;

    let mut missed = 0;
    for past in history.iter().rev() {
        let verdict = backfill
            .verdicts
            .get(&past.week)
            .copied()
            .or_else(|| athlete.verdict(past.week));
        match verdict {
            Some(Verdict::Passed) => break,
            Some(Verdict::Failed) => missed += 1,
            Some(Verdict::Exempt) | None => {}
        }
    }

    Ok((rules.multiplier(missed), backfill.requests))
}
