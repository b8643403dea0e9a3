// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for enrolled athletes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ChallengeWeek, RuleSet, WeekResult};
use crate::services::commands::{
    clear_week_results, toggle_joker, weekly_status, yearly_settlement, ClearScope, JokerOutcome,
    SettlementReport, WeeklyStatusReport,
};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/weeks/{week}", get(get_week))
        .route("/api/settlement", get(get_settlement))
        .route("/api/joker", post(post_joker))
        .route("/api/admin/clear-weeks", post(post_clear_weeks))
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Parse an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

// ─── Athlete Profile ─────────────────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub athlete_id: u64,
    pub name: String,
    pub profile_picture: Option<String>,
    pub jokers_remaining: u32,
    pub joker_weeks: Vec<u32>,
    pub rules: RuleSet,
    pub week_results: Vec<WeekResult>,
    pub is_admin: bool,
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let athlete = state
        .store
        .get_athlete(user.athlete_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Athlete {}", user.athlete_id)))?;

    Ok(Json(MeResponse {
        athlete_id: athlete.athlete_id,
        name: athlete.display_name(),
        profile_picture: athlete.profile_picture,
        jokers_remaining: athlete.jokers_remaining,
        joker_weeks: athlete.joker_weeks,
        rules: athlete.rules,
        week_results: athlete.week_results,
        is_admin: state.config.admin_athlete_id == Some(user.athlete_id),
    }))
}

// ─── Reports ─────────────────────────────────────────────────

async fn get_week(
    State(state): State<Arc<AppState>>,
    Path(week): Path<u32>,
) -> Result<Json<WeeklyStatusReport>> {
    let report = weekly_status(
        &state.strava,
        &state.store,
        state.config.challenge_year,
        week,
        today(),
    )
    .await?;
    Ok(Json(report))
}

async fn get_settlement(State(state): State<Arc<AppState>>) -> Result<Json<SettlementReport>> {
    let report =
        yearly_settlement(&state.strava, &state.store, state.config.challenge_year, today())
            .await?;
    Ok(Json(report))
}

// ─── Jokers ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct JokerRequest {
    /// Defaults to the current week
    #[serde(default)]
    pub week: Option<u32>,
}

async fn post_joker(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<JokerOutcome>> {
    let request: JokerRequest = optional_json(&body)?;

    let week = match request.week {
        Some(week) => week,
        None => {
            let current = ChallengeWeek::containing(today());
            if current.year != state.config.challenge_year {
                return Err(AppError::BadRequest(format!(
                    "Current week {} is outside the {} challenge",
                    current, state.config.challenge_year
                )));
            }
            current.week
        }
    };

    Ok(Json(toggle_joker(&state.store, user.athlete_id, week).await?))
}

// ─── Admin ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ClearWeeksRequest {
    #[serde(default)]
    pub athlete_id: Option<u64>,
    #[serde(default)]
    pub week: Option<u32>,
}

#[derive(Serialize)]
pub struct ClearWeeksResponse {
    pub cleared: usize,
}

async fn post_clear_weeks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<ClearWeeksResponse>> {
    user.require_admin(state.config.admin_athlete_id)?;

    let request: ClearWeeksRequest = optional_json(&body)?;
    let scope = match (request.athlete_id, request.week) {
        (None, None) => ClearScope::Everyone,
        (Some(athlete_id), None) => ClearScope::Athlete(athlete_id),
        (Some(athlete_id), Some(week)) => ClearScope::AthleteWeek(athlete_id, week),
        (None, Some(_)) => {
            return Err(AppError::BadRequest(
                "week requires athlete_id".to_string(),
            ))
        }
    };

    tracing::info!(admin = user.athlete_id, ?scope, "Clearing week results");
    let cleared = clear_week_results(&state.store, scope).await?;

    Ok(Json(ClearWeeksResponse { cleared }))
}
