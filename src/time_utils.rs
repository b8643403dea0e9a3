// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for challenge calendar arithmetic.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::AppError;
use crate::models::ChallengeWeek;

/// Highest week number accepted from users.
pub const MAX_WEEK: u32 = 52;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Smallest range covering every day of the given weeks.
    ///
    /// The end bound is the day after the last Sunday (exclusive).
    pub fn covering(weeks: &[ChallengeWeek]) -> Option<Self> {
        let first = weeks.iter().min()?;
        let last = weeks.iter().max()?;
        Some(Self {
            start: first.first_day(),
            end: last.last_day() + Duration::days(1),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// Minutes elapsed since local midnight.
pub fn minutes_past_midnight(at: NaiveDateTime) -> u32 {
    at.hour() * 60 + at.minute()
}

/// Day number used to count calendar days an activity spans.
pub fn day_ordinal(at: NaiveDateTime) -> i32 {
    at.date().num_days_from_ce()
}

/// Whether every day of the week is strictly before `today`.
pub fn is_fully_elapsed(week: ChallengeWeek, today: NaiveDate) -> bool {
    week.last_day() < today
}

/// Last fully elapsed week of a challenge year, relative to `today`.
///
/// Returns `None` if no week of that year has finished yet.
pub fn last_elapsed_week(year: i32, today: NaiveDate) -> Option<ChallengeWeek> {
    let current = ChallengeWeek::containing(today);
    if current.year > year {
        // Past challenge year: its final ISO week.
        let dec28 = NaiveDate::from_ymd_opt(year, 12, 28)?;
        return Some(ChallengeWeek::containing(dec28));
    }
    if current.year < year || current.week <= 1 {
        return None;
    }
    ChallengeWeek::new(year, current.week - 1)
}

/// Validate a user-supplied week number for a challenge year.
///
/// The week must lie in `[1, 52]` and be fully elapsed, so no verdict is
/// ever cached for a week that can still gain activities.
pub fn parse_challenge_week(year: i32, week: u32, today: NaiveDate) -> Result<ChallengeWeek, AppError> {
    if !(1..=MAX_WEEK).contains(&week) {
        return Err(AppError::InvalidWeek(format!(
            "Week must be between 1 and {}, got {}",
            MAX_WEEK, week
        )));
    }

    let challenge_week = ChallengeWeek::new(year, week).ok_or_else(|| {
        AppError::InvalidWeek(format!("Week {} does not exist in {}", week, year))
    })?;

    if !is_fully_elapsed(challenge_week, today) {
        return Err(AppError::InvalidWeek(format!(
            "Week {} has not finished yet ({} - {})",
            week,
            challenge_week.first_day(),
            challenge_week.last_day()
        )));
    }

    Ok(challenge_week)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_covering_weeks_is_exclusive() {
        let weeks = [
            ChallengeWeek::new(2024, 4).unwrap(),
            ChallengeWeek::new(2024, 2).unwrap(),
        ];
        let range = DateRange::covering(&weeks).unwrap();

        assert_eq!(range.start, date(2024, 1, 8));
        assert_eq!(range.end, date(2024, 1, 29));
        assert!(range.contains(date(2024, 1, 28)));
        assert!(!range.contains(date(2024, 1, 29)));
        assert!(DateRange::covering(&[]).is_none());
    }

    #[test]
    fn test_last_elapsed_week_current_year() {
        // Wednesday of 2024-W10
        let today = date(2024, 3, 6);
        assert_eq!(
            last_elapsed_week(2024, today),
            ChallengeWeek::new(2024, 9)
        );
    }

    #[test]
    fn test_last_elapsed_week_past_and_future_years() {
        let today = date(2024, 3, 6);
        assert_eq!(last_elapsed_week(2023, today), ChallengeWeek::new(2023, 52));
        assert_eq!(last_elapsed_week(2020, today), ChallengeWeek::new(2020, 53));
        assert_eq!(last_elapsed_week(2025, today), None);
        // Still inside week 1
        assert_eq!(last_elapsed_week(2024, date(2024, 1, 3)), None);
    }

    #[test]
    fn test_parse_challenge_week_rejects_out_of_range() {
        let today = date(2024, 12, 30);
        assert!(matches!(
            parse_challenge_week(2024, 0, today),
            Err(AppError::InvalidWeek(_))
        ));
        assert!(matches!(
            parse_challenge_week(2024, 53, today),
            Err(AppError::InvalidWeek(_))
        ));
    }

    #[test]
    fn test_parse_challenge_week_rejects_unfinished_week() {
        // Sunday of 2024-W10: the week is not over until Monday
        let today = date(2024, 3, 10);
        assert!(parse_challenge_week(2024, 10, today).is_err());
        assert!(parse_challenge_week(2024, 11, today).is_err());
        assert_eq!(
            parse_challenge_week(2024, 9, today).unwrap(),
            ChallengeWeek::new(2024, 9).unwrap()
        );
        assert!(parse_challenge_week(2024, 10, date(2024, 3, 11)).is_ok());
    }

    #[test]
    fn test_minutes_past_midnight_and_ordinal() {
        let at = date(2024, 1, 16).and_hms_opt(1, 30, 0).unwrap();
        let before = date(2024, 1, 15).and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(minutes_past_midnight(at), 90);
        assert_eq!(day_ordinal(at) - day_ordinal(before), 1);
    }
}
