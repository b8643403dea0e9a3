// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Normalized activity model used by week scoring.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::services::strava::StravaActivitySummary;

/// Strava encodes local start times with a trailing `Z` that is not a zone.
const LOCAL_START_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One exercise session, normalized from a Strava activity summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID
    pub id: u64,
    /// Activity name/title
    pub name: String,
    /// Activity category (Run, Walk, Workout, ...)
    pub activity_type: String,
    /// Local wall-clock start, no timezone conversion
    pub start_local: NaiveDateTime,
    /// Elapsed wall-clock duration in seconds
    pub elapsed_seconds: u64,
    /// Moving time in seconds (statistics only, never scored)
    pub moving_seconds: u64,
    /// Distance in meters
    pub distance_meters: f64,
}

impl Activity {
    /// Normalize a raw Strava summary.
    ///
    /// Returns `None` when the local start time cannot be parsed.
    pub fn from_summary(summary: &StravaActivitySummary) -> Option<Self> {
        let start_local =
            NaiveDateTime::parse_from_str(&summary.start_date_local, LOCAL_START_FORMAT).ok()?;

        let activity = Self {
            id: summary.id,
            name: summary.name.clone(),
            activity_type: summary.activity_type.clone(),
            start_local,
            elapsed_seconds: summary.elapsed_time.max(0) as u64,
            moving_seconds: summary.moving_time.max(0) as u64,
            distance_meters: summary.distance.max(0.0),
        };
        if activity.checked_end_local().is_none() {
            tracing::warn!(
                activity_id = activity.id,
                elapsed_seconds = activity.elapsed_seconds,
                "Elapsed time out of range, scoring activity as a single day"
            );
        }
        Some(activity)
    }

    /// Elapsed duration in (fractional) minutes.
    pub fn duration_minutes(&self) -> f64 {
        self.elapsed_seconds as f64 / 60.0
    }

    /// Moving time in minutes.
    pub fn moving_minutes(&self) -> f64 {
        self.moving_seconds as f64 / 60.0
    }

    /// Date component of the local start. Dedup key for daily credits.
    pub fn calendar_date(&self) -> NaiveDate {
        self.start_local.date()
    }

    /// Local wall-clock end of the activity.
    ///
    /// An elapsed time too large to represent ends at the start instant,
    /// so the activity spans a single day.
    pub fn end_local(&self) -> NaiveDateTime {
        self.checked_end_local().unwrap_or(self.start_local)
    }

    fn checked_end_local(&self) -> Option<NaiveDateTime> {
        let seconds = i64::try_from(self.elapsed_seconds).ok()?;
        self.start_local.checked_add_signed(TimeDelta::try_seconds(seconds)?)
    }
}
