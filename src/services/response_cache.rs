// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory cache of Strava activity pages keyed by request fingerprint.
//!
//! The access token is deliberately not part of the key: it rotates every
//! few hours, while the answer for a past week does not change.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::services::strava::StravaActivitySummary;

/// Hex SHA-256 over url, athlete id and query parameters.
pub fn fingerprint(url: &str, athlete_id: u64, params: &[(&str, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(athlete_id.to_string().as_bytes());
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"&");
    }
    hex::encode(hasher.finalize())
}

/// Shared page cache, cheap to clone.
#[derive(Clone, Default)]
pub struct ResponseCache {
    pages: Arc<DashMap<String, Vec<StravaActivitySummary>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<StravaActivitySummary>> {
        self.pages.get(key).map(|page| page.clone())
    }

    pub fn insert(&self, key: String, page: Vec<StravaActivitySummary>) {
        self.pages.insert(key, page);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
