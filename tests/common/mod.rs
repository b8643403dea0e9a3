// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use challenge_tracker::config::{Config, StorageBackend};
use challenge_tracker::db::{AthleteStore, FileStore, FirestoreDb};
use challenge_tracker::models::{AthleteRecord, RuleSet, StravaTokens, Verdict, WeekResult};
use challenge_tracker::routes::create_router;
use challenge_tracker::services::{StravaClient, StravaService};
use challenge_tracker::AppState;
use std::sync::Arc;
use tempfile::TempDir;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// File-backed store in a fresh temp directory.
///
/// Keep the returned `TempDir` alive for the duration of the test.
#[allow(dead_code)]
pub fn test_store() -> (TempDir, AthleteStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = AthleteStore::File(FileStore::new(dir.path().join("athletes.json")));
    (dir, store)
}

/// Athlete with non-expiring tokens and default rules.
#[allow(dead_code)]
pub fn test_athlete(athlete_id: u64) -> AthleteRecord {
    AthleteRecord {
        athlete_id,
        firstname: "Athlete".to_string(),
        lastname: athlete_id.to_string(),
        profile_picture: None,
        chat_user_id: None,
        tokens: StravaTokens {
            access_token: format!("access-{}", athlete_id),
            refresh_token: format!("refresh-{}", athlete_id),
            expires_at: chrono::Utc::now().timestamp() + 6 * 3600,
        },
        rules: RuleSet::default(),
        jokers_remaining: 1,
        joker_weeks: Vec::new(),
        week_results: Vec::new(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Athlete with pre-cached verdicts.
#[allow(dead_code)]
pub fn test_athlete_with_results(athlete_id: u64, results: &[(u32, Verdict)]) -> AthleteRecord {
    let mut athlete = test_athlete(athlete_id);
    athlete.week_results = results
        .iter()
        .map(|(week, verdict)| WeekResult {
            week: *week,
            verdict: *verdict,
        })
        .collect();
    athlete
}

/// Strava service talking to a mock server.
#[allow(dead_code)]
pub fn test_strava(base_url: &str, store: AthleteStore) -> StravaService {
    let client = StravaClient::with_base_urls(
        "test_client_id".to_string(),
        "test_secret".to_string(),
        base_url.to_string(),
        format!("{}/oauth", base_url),
    );
    StravaService::new(client, store)
}

/// Create a test app backed by a temp file store.
/// Returns the router, the shared state and the temp dir guard.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, TempDir) {
    let (dir, store) = test_store();
    let mut config = Config::test_default();
    config.storage = StorageBackend::File {
        path: dir.path().join("athletes.json"),
    };

    // Unroutable: no test reaching Strava should pass through here
    let strava = test_strava("http://127.0.0.1:9", store.clone());

    let state = Arc::new(AppState {
        config,
        store,
        strava,
    });

    (create_router(state.clone()), state, dir)
}
