// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable per-athlete, per-week verdict cache.
//!
//! Verdicts live on the athlete record, so every mutation is one atomic
//! read-modify-write of that record.

use crate::db::AthleteStore;
use crate::error::AppError;
use crate::models::Verdict;

#[derive(Clone)]
pub struct WeekResultCache {
    store: AthleteStore,
}

impl WeekResultCache {
    pub fn new(store: AthleteStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, athlete_id: u64, week: u32) -> Result<Option<Verdict>, AppError> {
        Ok(self
            .store
            .get_athlete(athlete_id)
            .await?
            .and_then(|athlete| athlete.verdict(week)))
    }

    /// Record a verdict, replacing any earlier one for the same week.
    pub async fn put(&self, athlete_id: u64, week: u32, verdict: Verdict) -> Result<(), AppError> {
        self.store
            .update_athlete(athlete_id, move |athlete| {
                athlete.set_verdict(week, verdict);
                Ok(())
            })
            .await?;
        tracing::debug!(athlete_id, week, ?verdict, "Week result cached");
        Ok(())
    }

    /// Drop one week so it is rescored on next access.
    pub async fn clear_week(&self, athlete_id: u64, week: u32) -> Result<bool, AppError> {
        self.store
            .update_athlete(athlete_id, move |athlete| Ok(athlete.remove_verdict(week)))
            .await
    }

    /// Drop every cached verdict of one athlete.
    pub async fn clear_all(&self, athlete_id: u64) -> Result<usize, AppError> {
        let removed = self
            .store
            .update_athlete(athlete_id, |athlete| {
                let removed = athlete.week_results.len();
                athlete.week_results.clear();
                Ok(removed)
            })
            .await?;
        tracing::info!(athlete_id, removed, "Week results cleared");
        Ok(removed)
    }

    /// Drop every cached verdict of every athlete.
    pub async fn clear_everyone(&self) -> Result<usize, AppError> {
        let athletes = self
            .store
            .update_all(|athlete| athlete.week_results.clear())
            .await?;
        tracing::info!(athletes, "Week results cleared for all athletes");
        Ok(athletes)
    }
}
