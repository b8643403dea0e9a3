// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Enrolled athlete record: identity, credentials, rules and challenge state.

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::rules::RuleSet;
use crate::models::week::{Verdict, WeekResult};

/// Strava OAuth tokens for an athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp when the access token expires
    pub expires_at: i64,
}

/// One enrolled athlete, stored as a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthleteRecord {
    /// Strava athlete ID (also used as document ID)
    pub athlete_id: u64,
    pub firstname: String,
    pub lastname: String,
    pub profile_picture: Option<String>,
    /// Chat user that linked this athlete, if any
    #[serde(default)]
    pub chat_user_id: Option<String>,
    pub tokens: StravaTokens,
    /// Rule snapshot taken at enrollment
    pub rules: RuleSet,
    /// Jokers still available this season
    #[serde(default)]
    pub jokers_remaining: u32,
    /// ISO weeks exempted by a joker
    #[serde(default)]
    pub joker_weeks: Vec<u32>,
    /// Cached verdicts, sorted by week
    #[serde(default, deserialize_with = "lenient_week_results")]
    pub week_results: Vec<WeekResult>,
    /// When the athlete enrolled (RFC 3339)
    pub created_at: String,
}

impl AthleteRecord {
    /// Display name used in reports.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }

    pub fn is_joker_week(&self, week: u32) -> bool {
        self.joker_weeks.contains(&week)
    }

    pub fn verdict(&self, week: u32) -> Option<Verdict> {
        self.week_results
            .binary_search_by_key(&week, |r| r.week)
            .ok()
            .map(|idx| self.week_results[idx].verdict)
    }

    /// Insert or replace the verdict for a week, keeping results sorted.
    pub fn set_verdict(&mut self, week: u32, verdict: Verdict) {
        match self.week_results.binary_search_by_key(&week, |r| r.week) {
            Ok(idx) => self.week_results[idx].verdict = verdict,
            Err(idx) => self.week_results.insert(idx, WeekResult { week, verdict }),
        }
    }

    /// Drop the verdict for a single week. Returns whether one existed.
    pub fn remove_verdict(&mut self, week: u32) -> bool {
        match self.week_results.binary_search_by_key(&week, |r| r.week) {
            Ok(idx) => {
                self.week_results.remove(idx);
                true
            }
            Err(_) => false,
        }
    }
}

/// Deserialize week results, treating an unreadable list as empty.
///
/// Scoring is idempotent, so dropping corrupt verdicts only costs a rescore.
fn lenient_week_results<'de, D>(deserializer: D) -> Result<Vec<WeekResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    match serde_json::from_value::<Vec<WeekResult>>(raw) {
        Ok(mut results) => {
            results.sort_by_key(|r| r.week);
            results.dedup_by_key(|r| r.week);
            Ok(results)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Data integrity: unreadable week results, treating as no prior verdicts"
            );
            Ok(Vec::new())
        }
    }
}
