// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete persistence.
//!
//! `AthleteStore` dispatches to Firestore or to a local JSON file. Both
//! backends serialize each athlete mutation as one read-modify-write.

pub mod file;
pub mod firestore;

pub use file::FileStore;
pub use firestore::FirestoreDb;

use crate::config::StorageBackend;
use crate::error::AppError;
use crate::models::AthleteRecord;

/// Collection names as constants.
pub mod collections {
    pub const ATHLETES: &str = "athletes";

    /// Athletes of one challenge year. Verdicts are keyed by week number
    /// only, so every season needs its own collection.
    pub fn athletes_for_year(year: i32) -> String {
        format!("{}_{}", ATHLETES, year)
    }
}

#[derive(Clone)]
pub enum AthleteStore {
    Firestore(FirestoreDb),
    File(FileStore),
}

impl AthleteStore {
    /// Open the configured backend.
    pub async fn connect(backend: &StorageBackend) -> Result<Self, AppError> {
        match backend {
            StorageBackend::Firestore {
                project_id,
                collection,
            } => {
                tracing::info!(collection = %collection, "Using Firestore athlete store");
                Ok(Self::Firestore(
                    FirestoreDb::new(project_id)
                        .await?
                        .with_collection(collection.as_str()),
                ))
            }
            StorageBackend::File { path } => {
                tracing::info!(path = %path.display(), "Using file athlete store");
                Ok(Self::File(FileStore::new(path.clone())))
            }
        }
    }

    pub async fn list_athletes(&self) -> Result<Vec<AthleteRecord>, AppError> {
        match self {
            Self::Firestore(db) => db.list_athletes().await,
            Self::File(store) => store.list_athletes().await,
        }
    }

    pub async fn get_athlete(&self, athlete_id: u64) -> Result<Option<AthleteRecord>, AppError> {
        match self {
            Self::Firestore(db) => db.get_athlete(athlete_id).await,
            Self::File(store) => store.get_athlete(athlete_id).await,
        }
    }

    /// Athlete linked to a chat account.
    pub async fn find_by_chat_user(
        &self,
        chat_user_id: &str,
    ) -> Result<Option<AthleteRecord>, AppError> {
        match self {
            Self::Firestore(db) => db.find_by_chat_user(chat_user_id).await,
            Self::File(store) => store.find_by_chat_user(chat_user_id).await,
        }
    }

    pub async fn upsert_athlete(&self, athlete: &AthleteRecord) -> Result<(), AppError> {
        match self {
            Self::Firestore(db) => db.upsert_athlete(athlete).await,
            Self::File(store) => store.upsert_athlete(athlete).await,
        }
    }

    /// Insert a new athlete. Returns `false`, writing nothing, if the athlete
    /// already exists.
    pub async fn create_athlete(&self, athlete: &AthleteRecord) -> Result<bool, AppError> {
        match self {
            Self::Firestore(db) => db.create_athlete(athlete).await,
            Self::File(store) => store.create_athlete(athlete).await,
        }
    }

    /// Atomically mutate one athlete. Returns `NotFound` if not enrolled.
    ///
    /// `f` may run more than once if the backend retries a contended write;
    /// only the last run's changes are stored.
    pub async fn update_athlete<F, R>(&self, athlete_id: u64, f: F) -> Result<R, AppError>
    where
        F: FnMut(&mut AthleteRecord) -> Result<R, AppError> + Send,
        R: Send,
    {
        match self {
            Self::Firestore(db) => db.update_athlete(athlete_id, f).await,
            Self::File(store) => store.update_athlete(athlete_id, f).await,
        }
    }

    /// Mutate every athlete. Returns the number of records touched.
    pub async fn update_all<F>(&self, f: F) -> Result<usize, AppError>
    where
        F: FnMut(&mut AthleteRecord) + Send,
    {
        match self {
            Self::Firestore(db) => db.update_all(f).await,
            Self::File(store) => store.update_all(f).await,
        }
    }
}
