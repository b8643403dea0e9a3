// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client and activity source.
//!
//! Handles:
//! - Paginated activity listing for a date range
//! - OAuth code exchange and token refresh
//! - Response caching keyed by request fingerprint
//! - HTTP error mapping (rate limit, revoked token, ...)

use crate::error::AppError;
use serde::{Deserialize, Serialize};

const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";
const STRAVA_OAUTH_URL: &str = "https://www.strava.com/oauth";

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_base_urls(
            client_id,
            client_secret,
            STRAVA_API_URL.to_string(),
            STRAVA_OAUTH_URL.to_string(),
        )
    }

    /// Client pointed at alternative endpoints (mock servers in tests).
    pub fn with_base_urls(
        client_id: String,
        client_secret: String,
        base_url: String,
        oauth_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            oauth_url,
            client_id,
            client_secret,
        }
    }

    pub fn activities_url(&self) -> String {
        format!("{}/athlete/activities", self.base_url)
    }

    /// List one page of activities (`after`, `before`, `page`, `per_page`).
    pub async fn list_activities(
        &self,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<StravaActivitySummary>, AppError> {
        let response = self
            .http
            .get(self.activities_url())
            .bearer_auth(access_token)
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Request failed: {}", e)))?;

        check_response_json(response).await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {}", e)))?;

        check_response_json(response).await
    }

    /// Exchange an OAuth authorization code for tokens and athlete profile.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token exchange failed");
            return Err(AppError::StravaApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("Failed to parse token response: {}", e)))
    }
}

/// Map a non-success status to a readable error.
fn status_error(status: reqwest::StatusCode, body: &str) -> AppError {
    let msg = match status.as_u16() {
        400 => "Bad request, a parameter is missing or malformed".to_string(),
        401 => AppError::STRAVA_TOKEN_ERROR.to_string(),
        403 => "Forbidden, the request was refused by Strava".to_string(),
        404 => "Not found".to_string(),
        429 => {
            tracing::warn!("Strava rate limit hit (429)");
            AppError::STRAVA_RATE_LIMIT.to_string()
        }
        500 => "Strava had an internal error, try again later".to_string(),
        _ => format!("HTTP {}: {}", status, body),
    };
    AppError::StravaApi(msg)
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    pub profile: Option<String>,
}

/// Summary activity for the list endpoint. Only the fields scoring needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Local wall-clock start, `YYYY-MM-DDTHH:MM:SSZ`
    pub start_date_local: String,
    /// Seconds
    pub elapsed_time: i64,
    /// Seconds
    #[serde(default)]
    pub moving_time: i64,
    /// Meters
    #[serde(default)]
    pub distance: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::AthleteStore;
use crate::models::{AthleteRecord, StravaTokens};
use crate::services::activity::{normalize_summaries, ActivitySource, FetchedActivities};
use crate::services::response_cache::{fingerprint, ResponseCache};
use crate::time_utils::DateRange;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Largest page Strava serves.
pub const ACTIVITIES_PER_PAGE: usize = 200;

/// Stop paginating after this many pages.
const MAX_PAGES: u32 = 50;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type.
pub type TokenCache = Arc<DashMap<u64, CachedToken>>;

/// Shared refresh locks type.
pub type RefreshLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// Strava-backed activity source with token lifecycle management.
///
/// Cheap to clone; all caches are shared between clones.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    store: AthleteStore,
    /// In-memory cache of access tokens.
    token_cache: TokenCache,
    /// Per-athlete mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
    response_cache: ResponseCache,
}

impl StravaService {
    pub fn new(client: StravaClient, store: AthleteStore) -> Self {
        Self {
            client,
            store,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            response_cache: ResponseCache::new(),
        }
    }

    pub fn client(&self) -> &StravaClient {
        &self.client
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.response_cache
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the athlete.
    ///
    /// 1. Check in-memory cache (no I/O)
    /// 2. Acquire per-athlete lock and re-check the cache
    /// 3. Re-read stored tokens, another request may have refreshed them
    /// 4. Refresh with Strava if expiring, persist and cache the result
    pub async fn get_valid_access_token(&self, athlete: &AthleteRecord) -> Result<String, AppError> {
        let athlete_id = athlete.athlete_id;
        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(cached) = self.token_cache.get(&athlete_id) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let lock = self
            .refresh_locks
            .entry(athlete_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        if let Some(cached) = self.token_cache.get(&athlete_id) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let tokens = match self.store.get_athlete(athlete_id).await? {
            Some(stored) => stored.tokens,
            None => athlete.tokens.clone(),
        };

        let expires_at = DateTime::from_timestamp(tokens.expires_at, 0).unwrap_or_default();
        if now + margin < expires_at {
            self.cache_token(athlete_id, &tokens.access_token, expires_at);
            return Ok(tokens.access_token);
        }

        tracing::info!(athlete_id, "Access token expired, refreshing");

        let refreshed = self.client.refresh_token(&tokens.refresh_token).await?;
        let new_tokens = StravaTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        };

        let stored_tokens = new_tokens.clone();
        self.store
            .update_athlete(athlete_id, move |record| {
                record.tokens = stored_tokens.clone();
                Ok(())
            })
            .await?;

        let new_expires_at = DateTime::from_timestamp(new_tokens.expires_at, 0).unwrap_or_default();
        self.cache_token(athlete_id, &new_tokens.access_token, new_expires_at);

        tracing::info!(athlete_id, "Token refreshed and stored");
        Ok(new_tokens.access_token)
    }

    fn cache_token(&self, athlete_id: u64, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            athlete_id,
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    /// Forget a cached token, e.g. after Strava rejected it.
    pub fn invalidate_token(&self, athlete_id: u64) {
        self.token_cache.remove(&athlete_id);
    }

    // ─── Activity Listing ────────────────────────────────────────────────────

    /// Fetch every page of activities for `range`.
    ///
    /// Strava filters on UTC timestamps while the range is in local dates, so
    /// the query is widened by one day on each side and the result filtered
    /// on the local start date.
    async fn fetch_range(
        &self,
        athlete: &AthleteRecord,
        range: DateRange,
        use_cache: bool,
    ) -> Result<FetchedActivities, AppError> {
        let athlete_id = athlete.athlete_id;
        let access_token = self.get_valid_access_token(athlete).await?;

        let after = midnight_timestamp(range.start - Duration::days(1));
        let before = midnight_timestamp(range.end + Duration::days(1));
        let url = self.client.activities_url();

        let mut fetched = FetchedActivities::default();
        let mut summaries = Vec::new();

        for page in 1..=MAX_PAGES {
            let params = [
                ("after", after.to_string()),
                ("before", before.to_string()),
                ("page", page.to_string()),
                ("per_page", ACTIVITIES_PER_PAGE.to_string()),
            ];
            let key = fingerprint(&url, athlete_id, &params);

            let cached = if use_cache {
                self.response_cache.get(&key)
            } else {
                None
            };

            let batch = match cached {
                Some(batch) => {
                    fetched.cached_requests += 1;
                    batch
                }
                None => {
                    let batch = match self.client.list_activities(&access_token, &params).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            if e.is_strava_token_error() {
                                self.invalidate_token(athlete_id);
                            }
                            return Err(e);
                        }
                    };
                    fetched.live_requests += 1;
                    self.response_cache.insert(key, batch.clone());
                    batch
                }
            };

            let short_page = batch.len() < ACTIVITIES_PER_PAGE;
            summaries.extend(batch);
            if short_page {
                break;
            }
            if page == MAX_PAGES {
                tracing::warn!(athlete_id, pages = page, "Stopped paginating at page limit");
            }
        }

        fetched.activities = normalize_summaries(athlete_id, &summaries, range);

        tracing::debug!(
            athlete_id,
            start = %range.start,
            end = %range.end,
            activities = fetched.activities.len(),
            live_requests = fetched.live_requests,
            cached_requests = fetched.cached_requests,
            "Fetched activities"
        );

        Ok(fetched)
    }
}

impl ActivitySource for StravaService {
    async fn fetch_activities(
        &self,
        athlete: &AthleteRecord,
        range: DateRange,
        use_cache: bool,
    ) -> Result<FetchedActivities, AppError> {
        self.fetch_range(athlete, range, use_cache)
            .await
            .map_err(|e| match e {
                AppError::StravaApi(msg) => AppError::StravaApi(format!(
                    "{} (athlete {})",
                    msg,
                    athlete.display_name()
                )),
                other => other,
            })
    }
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
