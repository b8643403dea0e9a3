// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge rule set, snapshotted onto each athlete at enrollment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

use crate::error::AppError;

/// Activity types that feed the interval-training channel.
pub const INTERVAL_TYPES: [&str; 2] = ["Workout", "WeightTraining"];

/// Activity type subject to the weekly walking cap.
pub const WALK_TYPE: &str = "Walk";

/// Default minimum durations (minutes) per activity type.
const DEFAULT_MIN_DURATIONS: [(&str, u32); 14] = [
    ("Ride", 60),
    ("Run", 30),
    ("WeightTraining", 60),
    ("NordicSki", 60),
    ("BackcountrySki", 60),
    ("Hike", 60),
    ("Walk", 60),
    ("Swim", 30),
    ("AlpineSki", 120),
    ("RockClimbing", 60),
    // HIT workouts and team sports that are not on Strava
    ("Workout", 60),
    ("Snowshoe", 60),
    ("VirtualRide", 60),
    ("Kayaking", 60),
];

/// Scoring and settlement thresholds for one athlete.
///
/// Each athlete owns a copy taken when they enroll, so later changes to the
/// configured defaults never rescore an enrolled athlete's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_interval_band"))]
#[serde(default)]
pub struct RuleSet {
    /// Minimum qualifying duration per activity type (minutes)
    #[validate(custom(function = "validate_min_durations"))]
    pub min_duration: BTreeMap<String, u32>,
    /// Grace margin subtracted from every threshold (minutes)
    pub tolerance: u32,
    /// Max distinct days per week a walk may earn a point
    pub walking_cap: u32,
    /// Short interval sessions needed for one point
    #[validate(range(min = 1))]
    pub interval_required: u32,
    /// Exclusive lower bound for an interval session (minutes)
    pub interval_min_minutes: u32,
    /// Exclusive upper bound for an interval session, before tolerance (minutes)
    pub interval_max_minutes: u32,
    /// Minutes past midnight needed to credit the last day of a multi-day activity
    #[validate(range(max = 1440))]
    pub multi_day_threshold_minutes: u32,
    /// Points needed in a week to avoid a penalty
    #[validate(range(min = 1))]
    pub points_required: u32,
    /// Base penalty for a missed week
    #[validate(range(min = 0.0))]
    pub price_per_missed_week: f64,
    /// Escalation factor for consecutive missed weeks
    #[validate(range(min = 1.0))]
    pub multiplier_base: f64,
    /// Whether consecutive misses escalate at all
    pub multiplier_enabled: bool,
    /// First ISO week of the challenge
    #[validate(range(min = 1, max = 53))]
    pub start_week: u32,
    /// Joker allowance per season
    pub jokers: u32,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            min_duration: DEFAULT_MIN_DURATIONS
                .iter()
                .map(|(name, minutes)| (name.to_string(), *minutes))
                .collect(),
            tolerance: 3,
            walking_cap: 1,
            interval_required: 2,
            interval_min_minutes: 10,
            interval_max_minutes: 60,
            multi_day_threshold_minutes: 360,
            points_required: 3,
            price_per_missed_week: 5.0,
            multiplier_base: 2.0,
            multiplier_enabled: true,
            start_week: 1,
            jokers: 1,
        }
    }
}

impl RuleSet {
    /// Validate, mapping failures to a configuration error.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()
            .map_err(|e| AppError::Configuration(format!("Invalid rule set: {}", e)))
    }

    /// Qualifying threshold for a type, after tolerance. `None` if the type is not scored.
    pub fn threshold_minutes(&self, activity_type: &str) -> Option<f64> {
        self.min_duration
            .get(activity_type)
            .map(|min| *min as f64 - self.tolerance as f64)
    }

    /// Whether a session of this type and length counts toward the interval channel.
    pub fn is_interval_session(&self, activity_type: &str, duration_minutes: f64) -> bool {
        let upper = self.interval_max_minutes as f64 - self.tolerance as f64;
        INTERVAL_TYPES.contains(&activity_type)
            && duration_minutes > self.interval_min_minutes as f64
            && duration_minutes < upper
    }

    /// Penalty multiplier after `missed` consecutive failed weeks.
    pub fn multiplier(&self, missed: u32) -> f64 {
        if self.multiplier_enabled {
            self.multiplier_base.powi(missed as i32)
        } else {
            1.0
        }
    }
}

fn validate_min_durations(rules: &BTreeMap<String, u32>) -> Result<(), ValidationError> {
    if rules.is_empty() {
        return Err(ValidationError::new("min_duration_empty"));
    }
    if rules.keys().any(|name| name.trim().is_empty()) {
        return Err(ValidationError::new("min_duration_blank_type"));
    }
    Ok(())
}

fn validate_interval_band(rules: &RuleSet) -> Result<(), ValidationError> {
    if rules.interval_max_minutes < rules.tolerance
        || rules.interval_min_minutes >= rules.interval_max_minutes - rules.tolerance
    {
        return Err(ValidationError::new("interval_band_empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = RuleSet::default();
        assert!(rules.check().is_ok());
        assert_eq!(rules.min_duration.len(), 14);
        assert_eq!(rules.threshold_minutes("Run"), Some(27.0));
        assert_eq!(rules.threshold_minutes("Yoga"), None);
    }

    #[test]
    fn test_interval_band_is_exclusive() {
        let rules = RuleSet::default();
        assert!(!rules.is_interval_session("Workout", 10.0));
        assert!(rules.is_interval_session("Workout", 10.5));
        assert!(rules.is_interval_session("WeightTraining", 56.9));
        assert!(!rules.is_interval_session("Workout", 57.0));
        assert!(!rules.is_interval_session("Run", 20.0));
    }

    #[test]
    fn test_multiplier_disabled_is_flat() {
        let mut rules = RuleSet::default();
        assert_eq!(rules.multiplier(3), 8.0);
        rules.multiplier_enabled = false;
        assert_eq!(rules.multiplier(3), 1.0);
    }

    #[test]
    fn test_invalid_rules_are_configuration_errors() {
        let rules = RuleSet {
            points_required: 0,
            ..RuleSet::default()
        };
        assert!(matches!(rules.check(), Err(AppError::Configuration(_))));

        let rules = RuleSet {
            min_duration: BTreeMap::new(),
            ..RuleSet::default()
        };
        assert!(rules.check().is_err());

        let rules = RuleSet {
            interval_min_minutes: 58,
            ..RuleSet::default()
        };
        assert!(rules.check().is_err());
    }

    #[test]
    fn test_partial_rules_file_keeps_defaults() {
        let parsed: RuleSet =
            serde_json::from_str(r#"{"points_required": 4, "walking_cap": 2}"#).unwrap();
        assert_eq!(parsed.points_required, 4);
        assert_eq!(parsed.walking_cap, 2);
        assert_eq!(parsed.tolerance, 3);
        assert_eq!(parsed.min_duration.get("Swim"), Some(&30));
    }
}
