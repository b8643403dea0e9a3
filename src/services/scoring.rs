// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Week scoring: converts one athlete's activities for one ISO week into points.
//!
//! Two independent credit channels:
//! 1. Interval training: short Workout/WeightTraining sessions, pooled
//!    (`interval_required` sessions = 1 point, at most one credit per day)
//! 2. Duration: one credit per activity type per day for sessions reaching the
//!    type's minimum duration, with a weekly cap on walks and extra points for
//!    activities spanning several calendar days

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::models::rules::WALK_TYPE;
use crate::models::{Activity, ChallengeWeek, RuleSet, Verdict};
use crate::time_utils::{day_ordinal, minutes_past_midnight};

/// Credits granted during one scoring pass.
///
/// Created fresh for every week that is scored.
#[derive(Debug, Default, Clone)]
pub struct CreditLedger {
    credited: HashSet<(String, NaiveDate)>,
    interval_dates: HashSet<NaiveDate>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_credited(&self, activity_type: &str, date: NaiveDate) -> bool {
        self.credited.contains(&(activity_type.to_string(), date))
    }

    fn credit(&mut self, activity_type: &str, date: NaiveDate) {
        self.credited.insert((activity_type.to_string(), date));
    }

    /// Distinct days that already earned a point of this type.
    pub fn days_credited(&self, activity_type: &str) -> usize {
        self.credited
            .iter()
            .filter(|(credited_type, _)| credited_type == activity_type)
            .count()
    }

    pub fn has_interval_credit(&self, date: NaiveDate) -> bool {
        self.interval_dates.contains(&date)
    }

    /// Every `(type, date)` pair credited so far.
    pub fn credited(&self) -> impl Iterator<Item = &(String, NaiveDate)> {
        self.credited.iter()
    }
}

/// Points earned in one week, split by channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekScore {
    pub week: ChallengeWeek,
    pub interval_points: u32,
    pub duration_points: u32,
}

impl WeekScore {
    pub fn points(&self) -> u32 {
        self.interval_points + self.duration_points
    }
}

/// Score one week.
///
/// Activities outside `week` are ignored. Activities are processed oldest
/// first whatever order they arrive in.
pub fn score_week(
    activities: &[Activity],
    rules: &RuleSet,
    week: ChallengeWeek,
    ledger: &mut CreditLedger,
) -> WeekScore {
    let mut in_week: Vec<&Activity> = activities
        .iter()
        .filter(|a| week.contains(a.calendar_date()))
        .collect();
    in_week.sort_by_key(|a| (a.start_local, a.id));

    let mut score = WeekScore {
        week,
        interval_points: 0,
        duration_points: 0,
    };
    let mut interval_counter = 0;

    for activity in in_week {
        let duration = activity.duration_minutes();
        let date = activity.calendar_date();

        if rules.is_interval_session(&activity.activity_type, duration) {
            if ledger.has_interval_credit(date) {
                tracing::debug!(
                    activity_id = activity.id,
                    %date,
                    "Interval session ignored, day already has an interval credit"
                );
                continue;
            }

            interval_counter += 1;
            if interval_counter >= rules.interval_required {
                score.interval_points += 1;
                ledger.interval_dates.insert(date);
                ledger.credit(&activity.activity_type, date);
                interval_counter = 0;
                tracing::debug!(
                    activity_id = activity.id,
                    %date,
                    "Interval sessions completed, 1 point"
                );
            }
            continue;
        }

        let points = duration_points(activity, rules, ledger);
        if points > 0 {
            tracing::debug!(
                activity_id = activity.id,
                activity_type = %activity.activity_type,
                %date,
                duration_minutes = duration,
                points,
                "Duration credit"
            );
        }
        score.duration_points += points;
    }

    score
}

/// Points from the duration channel for one activity, crediting the ledger.
fn duration_points(activity: &Activity, rules: &RuleSet, ledger: &mut CreditLedger) -> u32 {
    let Some(threshold) = rules.threshold_minutes(&activity.activity_type) else {
        return 0;
    };
    if activity.duration_minutes() < threshold {
        return 0;
    }

    if activity.activity_type == WALK_TYPE
        && ledger.days_credited(WALK_TYPE) >= rules.walking_cap as usize
    {
        tracing::debug!(
            activity_id = activity.id,
            walking_cap = rules.walking_cap,
            "Walk skipped, weekly walking cap reached"
        );
        return 0;
    }

    let date = activity.calendar_date();
    if ledger.is_credited(&activity.activity_type, date) {
        return 0;
    }

    let end = activity.end_local();
    let mut span_days = (day_ordinal(end) - day_ordinal(activity.start_local) + 1) as u32;
    if span_days > 1 && minutes_past_midnight(end) < rules.multi_day_threshold_minutes {
        tracing::debug!(
            activity_id = activity.id,
            span_days,
            minutes_past_midnight = minutes_past_midnight(end),
            "Last day of multi-day activity below threshold"
        );
        span_days -= 1;
    }

    ledger.credit(&activity.activity_type, date);
    span_days
}

/// Verdict for a scored week.
pub fn verdict_for(points: u32, rules: &RuleSet, exempt: bool) -> Verdict {
    if exempt {
        Verdict::Exempt
    } else if points < rules.points_required {
        Verdict::Failed
    } else {
        Verdict::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn week() -> ChallengeWeek {
        // Monday 2024-01-15 .. Sunday 2024-01-21
        ChallengeWeek::new(2024, 3).unwrap()
    }

    fn activity(id: u64, activity_type: &str, start: &str, elapsed_seconds: u64) -> Activity {
        Activity {
            id,
            name: format!("Activity {}", id),
            activity_type: activity_type.to_string(),
            start_local: NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap(),
            elapsed_seconds,
            moving_seconds: elapsed_seconds,
            distance_meters: 0.0,
        }
    }

    fn score(activities: &[Activity], rules: &RuleSet) -> WeekScore {
        score_week(activities, rules, week(), &mut CreditLedger::new())
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let rules = RuleSet::default();

        let exact = [activity(1, "Run", "2024-01-15 07:00", 27 * 60)];
        assert_eq!(score(&exact, &rules).points(), 1);

        // 26.9 minutes
        let short = [activity(1, "Run", "2024-01-15 07:00", 1614)];
        assert_eq!(score(&short, &rules).points(), 0);
    }

    #[test]
    fn test_unknown_type_never_scores() {
        let rules = RuleSet::default();
        let activities = [activity(1, "Yoga", "2024-01-15 07:00", 120 * 60)];
        assert_eq!(score(&activities, &rules).points(), 0);
    }

    #[test]
    fn test_one_credit_per_type_per_day() {
        let rules = RuleSet::default();
        let activities = [
            activity(1, "Run", "2024-01-15 07:00", 40 * 60),
            activity(2, "Run", "2024-01-15 18:00", 40 * 60),
            activity(3, "Ride", "2024-01-15 12:00", 90 * 60),
            activity(4, "Run", "2024-01-16 07:00", 40 * 60),
        ];
        let mut ledger = CreditLedger::new();
        let result = score_week(&activities, &rules, week(), &mut ledger);

        assert_eq!(result.points(), 3);
        assert_eq!(ledger.days_credited("Run"), 2);
        assert!(ledger.is_credited("Ride", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    }

    #[test]
    fn test_walking_cap_is_independent_of_arrival_order() {
        let rules = RuleSet {
            walking_cap: 2,
            ..RuleSet::default()
        };
        let mut activities = vec![
            activity(1, "Walk", "2024-01-15 08:00", 70 * 60),
            activity(2, "Walk", "2024-01-16 08:00", 70 * 60),
            activity(3, "Walk", "2024-01-17 08:00", 70 * 60),
        ];

        let mut ledger = CreditLedger::new();
        assert_eq!(score_week(&activities, &rules, week(), &mut ledger).points(), 2);
        let forward: Vec<_> = {
            let mut v: Vec<_> = ledger.credited().cloned().collect();
            v.sort();
            v
        };

        activities.reverse();
        let mut ledger = CreditLedger::new();
        assert_eq!(score_week(&activities, &rules, week(), &mut ledger).points(), 2);
        let mut reversed: Vec<_> = ledger.credited().cloned().collect();
        reversed.sort();

        // Oldest-first processing picks the same two days either way
        assert_eq!(forward, reversed);
        assert!(!ledger.is_credited("Walk", NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()));
    }

    #[test]
    fn test_interval_channel_pairs_sessions() {
        let rules = RuleSet::default();
        let activities = [
            activity(1, "Workout", "2024-01-15 07:00", 15 * 60),
            activity(2, "Workout", "2024-01-16 07:00", 15 * 60),
        ];
        let result = score(&activities, &rules);

        assert_eq!(result.interval_points, 1);
        assert_eq!(result.duration_points, 0);
        assert_eq!(result.points(), 1);
    }

    #[test]
    fn test_interval_sessions_never_reach_duration_channel() {
        // Duration rule low enough that a 15 minute workout would qualify on its own
        let mut rules = RuleSet::default();
        rules.min_duration.insert("Workout".to_string(), 12);

        let activities = [activity(1, "Workout", "2024-01-15 07:00", 15 * 60)];
        assert_eq!(score(&activities, &rules).points(), 0);
    }

    #[test]
    fn test_interval_credit_once_per_day() {
        let rules = RuleSet::default();
        let activities = [
            activity(1, "Workout", "2024-01-15 07:00", 15 * 60),
            activity(2, "WeightTraining", "2024-01-15 12:00", 20 * 60),
            activity(3, "Workout", "2024-01-15 18:00", 15 * 60),
            activity(4, "Workout", "2024-01-15 20:00", 15 * 60),
        ];
        // Sessions 1+2 earn the point on the 15th; 3 and 4 land on an already credited day
        assert_eq!(score(&activities, &rules).points(), 1);
    }

    #[test]
    fn test_long_workout_uses_duration_channel() {
        let rules = RuleSet::default();
        let activities = [activity(1, "Workout", "2024-01-15 07:00", 65 * 60)];
        let result = score(&activities, &rules);
        assert_eq!(result.duration_points, 1);
        assert_eq!(result.interval_points, 0);
    }

    #[test]
    fn test_multi_day_span_below_threshold() {
        let rules = RuleSet::default();
        // 23:00 + 150 minutes ends 01:30 the next day
        let activities = [activity(1, "Hike", "2024-01-15 23:00", 150 * 60)];
        assert_eq!(score(&activities, &rules).points(), 1);
    }

    #[test]
    fn test_multi_day_span_above_threshold() {
        let rules = RuleSet::default();
        // 23:00 + 480 minutes ends 07:00 the next day
        let activities = [activity(1, "Hike", "2024-01-15 23:00", 480 * 60)];
        assert_eq!(score(&activities, &rules).points(), 2);
    }

    #[test]
    fn test_three_day_span_only_reduces_tail_day() {
        let rules = RuleSet::default();
        // Ends 02:00 two days later
        let activities = [activity(1, "Hike", "2024-01-15 20:00", 30 * 3600)];
        assert_eq!(score(&activities, &rules).points(), 2);
    }

    #[test]
    fn test_out_of_range_elapsed_time_scores_one_day() {
        let rules = RuleSet::default();
        let activities = [activity(1, "Hike", "2024-01-15 08:00", 10_000_000_000_000)];
        assert_eq!(score(&activities, &rules).points(), 1);
    }

    #[test]
    fn test_activities_outside_week_are_ignored() {
        let rules = RuleSet::default();
        let activities = [
            activity(1, "Run", "2024-01-14 07:00", 40 * 60),
            activity(2, "Run", "2024-01-22 07:00", 40 * 60),
            activity(3, "Run", "2023-01-18 07:00", 40 * 60),
        ];
        assert_eq!(score(&activities, &rules).points(), 0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let rules = RuleSet::default();
        let activities = [
            activity(1, "Run", "2024-01-15 07:00", 40 * 60),
            activity(2, "Workout", "2024-01-16 07:00", 15 * 60),
            activity(3, "Workout", "2024-01-17 07:00", 15 * 60),
            activity(4, "Walk", "2024-01-18 07:00", 61 * 60),
        ];
        let first = score(&activities, &rules);
        let second = score(&activities, &rules);
        assert_eq!(first, second);
        assert_eq!(first.points(), 3);
    }

    #[test]
    fn test_verdict_for() {
        let rules = RuleSet::default();
        assert_eq!(verdict_for(2, &rules, false), Verdict::Failed);
        assert_eq!(verdict_for(3, &rules, false), Verdict::Passed);
        assert_eq!(verdict_for(0, &rules, true), Verdict::Exempt);
        assert_eq!(verdict_for(5, &rules, true), Verdict::Exempt);
    }
}
