// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore backend: one document per athlete, one collection per
//! challenge year (`athletes_<year>`).
//!
//! Every mutation is a read-modify-write of a single athlete document inside
//! a Firestore transaction. The read goes through the transaction so a
//! concurrent commit to the same document aborts ours, and we retry.

use std::time::Duration;

use firestore::errors::FirestoreError;
use firestore::FirestoreConsistencySelector;

use crate::db::collections;
use crate::error::AppError;
use crate::models::AthleteRecord;

/// Attempts for a contended read-modify-write before giving up.
const MAX_TRANSACTION_ATTEMPTS: u32 = 10;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    collection: String,
}

/// Whether a failed transaction may succeed on a fresh attempt.
fn is_contention(err: &FirestoreError) -> bool {
    match err {
        FirestoreError::DatabaseError(db_err) => db_err.retry_possible,
        FirestoreError::DataConflictError(_) => true,
        _ => false,
    }
}

enum Attempt<R> {
    Done(R),
    Contended(FirestoreError),
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            collection: collections::ATHLETES.to_string(),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            collection: collections::ATHLETES.to_string(),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            collection: collections::ATHLETES.to_string(),
        }
    }

    /// Use another collection for athlete documents.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub async fn get_athlete(&self, athlete_id: u64) -> Result<Option<AthleteRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(self.collection.as_str())
            .obj()
            .one(&athlete_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn list_athletes(&self) -> Result<Vec<AthleteRecord>, AppError> {
        let mut athletes: Vec<AthleteRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(self.collection.as_str())
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        athletes.sort_by_key(|a| a.athlete_id);
        Ok(athletes)
    }

    pub async fn find_by_chat_user(
        &self,
        chat_user_id: &str,
    ) -> Result<Option<AthleteRecord>, AppError> {
        let chat_user_id = chat_user_id.to_string();
        let matches: Vec<AthleteRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(self.collection.as_str())
            .filter(move |q| q.for_all([q.field("chat_user_id").eq(chat_user_id.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(matches.into_iter().next())
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Create or replace an athlete document.
    pub async fn upsert_athlete(&self, athlete: &AthleteRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(self.collection.as_str())
            .document_id(athlete.athlete_id.to_string())
            .object(athlete)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create an athlete document unless one already exists.
    ///
    /// Returns `false` if the athlete was already enrolled.
    pub async fn create_athlete(&self, athlete: &AthleteRecord) -> Result<bool, AppError> {
        let created: Result<AthleteRecord, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(self.collection.as_str())
            .document_id(athlete.athlete_id.to_string())
            .object(athlete)
            .execute()
            .await;
        match created {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Read-modify-write one athlete document in a transaction.
    ///
    /// `f` runs once per attempt on a freshly read record; a commit that
    /// conflicts with another writer is retried. If `f` returns an error the
    /// transaction is rolled back and nothing is written.
    pub async fn update_athlete<F, R>(&self, athlete_id: u64, mut f: F) -> Result<R, AppError>
    where
        F: FnMut(&mut AthleteRecord) -> Result<R, AppError> + Send,
        R: Send,
    {
        let mut attempt = 1;
        loop {
            match self.try_update_athlete(athlete_id, &mut f).await? {
                Attempt::Done(result) => return Ok(result),
                Attempt::Contended(e) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(athlete_id, attempt, error = %e, "Athlete update contended, retrying");
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Attempt::Contended(e) => {
                    return Err(AppError::Database(format!(
                        "Athlete {} update still contended after {} attempts: {}",
                        athlete_id, attempt, e
                    )))
                }
            }
        }
    }

    async fn try_update_athlete<F, R>(
        &self,
        athlete_id: u64,
        f: &mut F,
    ) -> Result<Attempt<R>, AppError>
    where
        F: FnMut(&mut AthleteRecord) -> Result<R, AppError> + Send,
        R: Send,
    {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reading through the transaction registers the document for conflict detection
        let reader = client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ));
        let current: Option<AthleteRecord> = match reader
            .fluent()
            .select()
            .by_id_in(self.collection.as_str())
            .obj()
            .one(&athlete_id.to_string())
            .await
        {
            Ok(current) => current,
            Err(e) => {
                let _ = transaction.rollback().await;
                if is_contention(&e) {
                    return Ok(Attempt::Contended(e));
                }
                return Err(AppError::Database(format!(
                    "Failed to read athlete in transaction: {}",
                    e
                )));
            }
        };

        let Some(mut athlete) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("Athlete {}", athlete_id)));
        };

        let result = match f(&mut athlete) {
            Ok(result) => result,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        client
            .fluent()
            .update()
            .in_col(self.collection.as_str())
            .document_id(athlete_id.to_string())
            .object(&athlete)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add athlete to transaction: {}", e))
            })?;

        match transaction.commit().await {
            Ok(_) => Ok(Attempt::Done(result)),
            Err(e) if is_contention(&e) => Ok(Attempt::Contended(e)),
            Err(e) => Err(AppError::Database(format!("Transaction commit failed: {}", e))),
        }
    }

    /// Apply `f` to every athlete, one transaction per document.
    ///
    /// Returns the number of documents updated.
    pub async fn update_all<F>(&self, mut f: F) -> Result<usize, AppError>
    where
        F: FnMut(&mut AthleteRecord) + Send,
    {
        let athletes = self.list_athletes().await?;
        let mut updated = 0;
        for athlete in athletes {
            match self
                .update_athlete(athlete.athlete_id, |record| {
                    f(record);
                    Ok(())
                })
                .await
            {
                Ok(()) => updated += 1,
                // Deleted between list and update
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }
}
