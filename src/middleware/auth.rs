// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Session lifetime.
const SESSION_TTL_SECS: usize = 30 * 24 * 60 * 60;

/// Lifetime of the signed OAuth `state` parameter.
const OAUTH_STATE_TTL_SECS: usize = 10 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (Strava athlete ID, or chat user ID for OAuth state)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated athlete extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub athlete_id: u64,
}

impl AuthUser {
    /// Fail with `Forbidden` unless this athlete is the configured admin.
    pub fn require_admin(&self, admin_athlete_id: Option<u64>) -> Result<(), AppError> {
        if admin_athlete_id == Some(self.athlete_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".to_string()))
        }
    }
}

/// Middleware that requires a valid bearer JWT.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_claims(token, &state.config.jwt_signing_key)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let athlete_id: u64 = claims.sub.parse().map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(AuthUser { athlete_id });

    Ok(next.run(request).await)
}

fn now_secs() -> anyhow::Result<usize> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize)
}

fn sign(sub: String, ttl_secs: usize, signing_key: &[u8]) -> anyhow::Result<String> {
    let now = now_secs()?;
    let claims = Claims {
        sub,
        iat: now,
        exp: now + ttl_secs,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

fn decode_claims(token: &str, signing_key: &[u8]) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation).map(|data| data.claims)
}

/// Create a JWT for an athlete session.
pub fn create_jwt(athlete_id: u64, signing_key: &[u8]) -> anyhow::Result<String> {
    sign(athlete_id.to_string(), SESSION_TTL_SECS, signing_key)
}

/// Sign the OAuth `state` parameter carrying the (possibly empty) chat user ID.
pub fn create_oauth_state(chat_user_id: Option<&str>, signing_key: &[u8]) -> anyhow::Result<String> {
    sign(
        chat_user_id.unwrap_or_default().to_string(),
        OAUTH_STATE_TTL_SECS,
        signing_key,
    )
}

/// Verify an OAuth `state` parameter and return the chat user ID it carries.
pub fn verify_oauth_state(state: &str, signing_key: &[u8]) -> Result<Option<String>, AppError> {
    let claims = decode_claims(state, signing_key).map_err(|e| {
        tracing::warn!(error = %e, "Rejected OAuth state");
        AppError::BadRequest("Invalid or expired OAuth state".to_string())
    })?;
    Ok(Some(claims.sub).filter(|sub| !sub.is_empty()))
}
