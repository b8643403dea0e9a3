// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod activity;
pub mod commands;
pub mod response_cache;
pub mod scoring;
pub mod settlement;
pub mod strava;
pub mod week_cache;

pub use activity::{ActivitySource, FetchSource, FetchedActivities};
pub use response_cache::ResponseCache;
pub use settlement::{Settlement, WeekCharge};
pub use strava::{StravaClient, StravaService};
pub use week_cache::WeekResultCache;
