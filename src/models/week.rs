// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Week identifiers and per-week verdicts.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Outcome of scoring one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not enough points
    Failed,
    /// Quota met
    Passed,
    /// A joker was applied
    Exempt,
}

/// Cached verdict for one ISO week number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekResult {
    pub week: u32,
    pub verdict: Verdict,
}

/// An ISO calendar week of a challenge year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChallengeWeek {
    pub year: i32,
    pub week: u32,
}

impl ChallengeWeek {
    /// Build a week, returning `None` if the year has no such ISO week.
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    /// The ISO week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday of this week.
    pub fn first_day(&self) -> NaiveDate {
        // Constructors guarantee the week exists.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or_default()
    }

    /// Sunday of this week.
    pub fn last_day(&self) -> NaiveDate {
        self.first_day() + Duration::days(6)
    }

    /// Whether `date` falls in this week.
    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::containing(date) == *self
    }

    /// Following week within the same ISO year, if any.
    pub fn next(&self) -> Option<Self> {
        Self::new(self.year, self.week + 1)
    }
}

impl std::fmt::Display for ChallengeWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_bounds() {
        let week = ChallengeWeek::new(2024, 3).unwrap();
        assert_eq!(week.first_day(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(week.last_day(), NaiveDate::from_ymd_opt(2024, 1, 21).unwrap());
        assert_eq!(week.to_string(), "2024-W03");
    }

    #[test]
    fn test_first_iso_week_can_start_in_previous_year() {
        // 2025-W01 starts on Monday 2024-12-30
        let week = ChallengeWeek::new(2025, 1).unwrap();
        assert_eq!(week.first_day(), NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());
        assert!(week.contains(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
    }

    #[test]
    fn test_same_week_number_different_year_does_not_match() {
        let week = ChallengeWeek::new(2024, 3).unwrap();
        assert!(!week.contains(NaiveDate::from_ymd_opt(2023, 1, 18).unwrap()));
    }

    #[test]
    fn test_nonexistent_week() {
        assert!(ChallengeWeek::new(2024, 53).is_none());
        assert!(ChallengeWeek::new(2020, 53).is_some());
        assert!(ChallengeWeek::new(2024, 0).is_none());
        assert!(ChallengeWeek::new(2024, 52).unwrap().next().is_none());
    }

    #[test]
    fn test_verdict_serializes_snake_case() {
        let json = serde_json::to_string(&Verdict::Exempt).unwrap();
        assert_eq!(json, "\"exempt\"");
    }
}
