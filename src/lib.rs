// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Challenge-Tracker: weekly fitness challenge scoring and settlement
//!
//! This crate provides the backend API that turns Strava activities into
//! weekly points, caches a verdict per athlete and week, and settles the
//! escalating penalty owed for missed weeks.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::AthleteStore;
use services::StravaService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: AthleteStore,
    pub strava: StravaService,
}
