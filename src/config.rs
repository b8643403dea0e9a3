// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The default rule set can be overridden with a JSON file (`RULES_FILE`).
//! Overrides only apply to athletes enrolled afterwards.

use chrono::Datelike;
use std::env;
use std::path::{Path, PathBuf};

use crate::db::collections;
use crate::models::RuleSet;

/// Which backend persists athlete records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Google Cloud Firestore (one document per athlete, one collection per year)
    Firestore {
        project_id: String,
        collection: String,
    },
    /// Local JSON file (single collection file)
    File { path: PathBuf },
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Server port
    pub port: u16,
    /// Challenge year being evaluated
    pub challenge_year: i32,
    /// Athlete allowed to run admin commands
    pub admin_athlete_id: Option<u64>,
    /// Athlete persistence backend
    pub storage: StorageBackend,
    /// Rules snapshotted onto newly enrolled athletes
    pub default_rules: RuleSet,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            port: 8080,
            challenge_year: 2024,
            admin_athlete_id: Some(1),
            storage: StorageBackend::File {
                path: env::temp_dir().join("challenge-tracker-test").join("athletes.json"),
            },
            default_rules: RuleSet::default(),
            strava_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let challenge_year = match env::var("CHALLENGE_YEAR") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("CHALLENGE_YEAR", raw))?,
            Err(_) => chrono::Local::now().year(),
        };

        let admin_athlete_id = match env::var("ADMIN_ATHLETE_ID") {
            Ok(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("ADMIN_ATHLETE_ID", raw))?,
            ),
            Err(_) => None,
        };

        let storage = match env::var("GCP_PROJECT_ID") {
            Ok(project_id) => StorageBackend::Firestore {
                project_id,
                collection: collections::athletes_for_year(challenge_year),
            },
            Err(_) => {
                let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
                StorageBackend::File {
                    path: Path::new(&data_dir)
                        .join(challenge_year.to_string())
                        .join("athletes.json"),
                }
            }
        };

        let default_rules = match env::var("RULES_FILE") {
            Ok(path) => load_rules_file(Path::new(&path))?,
            Err(_) => RuleSet::default(),
        };

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            challenge_year,
            admin_athlete_id,
            storage,
            default_rules,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Load and validate a rule set from a JSON file.
///
/// Missing fields fall back to the built-in defaults.
pub fn load_rules_file(path: &Path) -> Result<RuleSet, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::RulesFile(format!("{}: {}", path.display(), e)))?;
    let rules: RuleSet = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::RulesFile(format!("{}: {}", path.display(), e)))?;
    rules
        .check()
        .map_err(|e| ConfigError::RulesFile(e.to_string()))?;

    tracing::info!(path = %path.display(), "Loaded default rules");
    Ok(rules)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Rules file error: {0}")]
    RulesFile(String),
}
