// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity source boundary.
//!
//! The engine only needs "all activities of an athlete whose local start
//! date lies in a range". `StravaService` is the production source; tests
//! plug in in-memory sources.

use std::future::Future;

use crate::error::AppError;
use crate::models::{Activity, AthleteRecord};
use crate::services::strava::StravaActivitySummary;
use crate::time_utils::DateRange;

/// Where a fetch was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Live,
}

/// Activities returned by one fetch plus request accounting.
#[derive(Debug, Clone, Default)]
pub struct FetchedActivities {
    pub activities: Vec<Activity>,
    /// Pages requested from Strava
    pub live_requests: u32,
    /// Pages answered by the response cache
    pub cached_requests: u32,
}

impl FetchedActivities {
    /// `Live` if any page needed a network request.
    pub fn source(&self) -> FetchSource {
        if self.live_requests > 0 {
            FetchSource::Live
        } else {
            FetchSource::Cache
        }
    }
}

/// Something that can list an athlete's activities for a date range.
pub trait ActivitySource: Send + Sync {
    /// All activities whose local start date lies in `[range.start, range.end)`.
    ///
    /// With `use_cache == false` every page is fetched live.
    fn fetch_activities(
        &self,
        athlete: &AthleteRecord,
        range: DateRange,
        use_cache: bool,
    ) -> impl Future<Output = Result<FetchedActivities, AppError>> + Send;
}

/// Normalize raw summaries, keeping only those starting inside `range`.
///
/// Summaries with an unparseable start are skipped with a warning.
pub fn normalize_summaries(
    athlete_id: u64,
    summaries: &[StravaActivitySummary],
    range: DateRange,
) -> Vec<Activity> {
    summaries
        .iter()
        .filter_map(|summary| match Activity::from_summary(summary) {
            Some(activity) => Some(activity),
            None => {
                tracing::warn!(
                    athlete_id,
                    activity_id = summary.id,
                    start_date_local = %summary.start_date_local,
                    "Skipping activity with unparseable start time"
                );
                None
            }
        })
        .filter(|activity| range.contains(activity.calendar_date()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn summary(id: u64, start: &str) -> StravaActivitySummary {
        StravaActivitySummary {
            id,
            name: "Ride".to_string(),
            activity_type: "Ride".to_string(),
            start_date_local: start.to_string(),
            elapsed_time: 3600,
            moving_time: 3500,
            distance: 20_000.0,
        }
    }

    #[test]
    fn test_normalize_filters_on_local_date() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 22).unwrap(),
        };
        let summaries = [
            summary(1, "2024-01-14T23:59:00Z"),
            summary(2, "2024-01-15T00:00:00Z"),
            summary(3, "2024-01-21T23:59:59Z"),
            summary(4, "2024-01-22T00:00:00Z"),
            summary(5, "not a date"),
        ];

        let ids: Vec<u64> = normalize_summaries(42, &summaries, range)
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_fetch_source() {
        let mut fetched = FetchedActivities::default();
        fetched.cached_requests = 2;
        assert_eq!(fetched.source(), FetchSource::Cache);
        fetched.live_requests = 1;
        assert_eq!(fetched.source(), FetchSource::Live);
    }
}
