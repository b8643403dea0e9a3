// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod athlete;
pub mod rules;
pub mod week;

pub use activity::Activity;
pub use athlete::{AthleteRecord, StravaTokens};
pub use rules::RuleSet;
pub use week::{ChallengeWeek, Verdict, WeekResult};
