// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth enrollment routes.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, create_oauth_state, verify_oauth_state};
use crate::services::commands::enroll_athlete;
use crate::AppState;

const STRAVA_AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava", get(auth_start))
        .route("/auth/strava/callback", get(auth_callback))
}

#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Chat account to link with the enrolling athlete
    #[serde(default)]
    chat_user_id: Option<String>,
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let oauth_state =
        create_oauth_state(params.chat_user_id.as_deref(), &state.config.jwt_signing_key)?;

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    let callback_url = format!("{}://{}/auth/strava/callback", scheme, host);

    let auth_url = reqwest::Url::parse_with_params(
        STRAVA_AUTHORIZE_URL,
        &[
            ("client_id", state.config.strava_client_id.as_str()),
            ("redirect_uri", callback_url.as_str()),
            ("response_type", "code"),
            ("approval_prompt", "auto"),
            ("scope", "activity:read_all"),
            ("state", oauth_state.as_str()),
        ],
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid authorize URL: {}", e)))?;

    tracing::info!(
        client_id = %state.config.strava_client_id,
        "Starting OAuth flow, redirecting to Strava"
    );

    Ok(Redirect::temporary(auth_url.as_str()))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub athlete_id: u64,
    pub name: String,
    pub jokers_remaining: u32,
    /// Bearer token for the `/api` routes
    pub token: String,
}

/// OAuth callback - exchange code for tokens, enroll athlete, issue session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<EnrollResponse>> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Strava authorization denied");
        return Err(AppError::Unauthorized);
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let chat_user_id = verify_oauth_state(&params.state, &state.config.jwt_signing_key)?;

    let exchange = state.strava.client().exchange_code(&code).await?;
    let athlete = enroll_athlete(
        &state.store,
        exchange,
        &state.config.default_rules,
        chat_user_id,
    )
    .await?;

    let token = create_jwt(athlete.athlete_id, &state.config.jwt_signing_key)?;

    Ok(Json(EnrollResponse {
        athlete_id: athlete.athlete_id,
        name: athlete.display_name(),
        jokers_remaining: athlete.jokers_remaining,
        token,
    }))
}
