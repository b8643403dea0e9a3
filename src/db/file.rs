// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON file backend: all athletes of a challenge year in one file.
//!
//! A single async mutex guards the whole collection. Writes go to a temp
//! file in the same directory which is then renamed over the original, so a
//! crash never leaves a half-written collection behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::AthleteRecord;

#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<AthleteRecord>, AppError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Database(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Database(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, athletes: &[AthleteRecord]) -> Result<(), AppError> {
        let db_err =
            |e: std::io::Error| AppError::Database(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(db_err)?;
        }

        let json = serde_json::to_vec_pretty(athletes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Serialize athletes: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(db_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(db_err)?;
        Ok(())
    }

    pub async fn list_athletes(&self) -> Result<Vec<AthleteRecord>, AppError> {
        let _guard = self.lock.lock().await;
        let mut athletes = self.load().await?;
        athletes.sort_by_key(|a| a.athlete_id);
        Ok(athletes)
    }

    pub async fn get_athlete(&self, athlete_id: u64) -> Result<Option<AthleteRecord>, AppError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|a| a.athlete_id == athlete_id))
    }

    pub async fn find_by_chat_user(
        &self,
        chat_user_id: &str,
    ) -> Result<Option<AthleteRecord>, AppError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|a| a.chat_user_id.as_deref() == Some(chat_user_id)))
    }

    pub async fn upsert_athlete(&self, athlete: &AthleteRecord) -> Result<(), AppError> {
        let _guard = self.lock.lock().await;
        let mut athletes = self.load().await?;
        match athletes
            .iter_mut()
            .find(|a| a.athlete_id == athlete.athlete_id)
        {
            Some(existing) => *existing = athlete.clone(),
            None => athletes.push(athlete.clone()),
        }
        self.save(&athletes).await
    }

    /// Insert a new athlete unless one with the same id exists.
    pub async fn create_athlete(&self, athlete: &AthleteRecord) -> Result<bool, AppError> {
        let _guard = self.lock.lock().await;
        let mut athletes = self.load().await?;
        if athletes.iter().any(|a| a.athlete_id == athlete.athlete_id) {
            return Ok(false);
        }
        athletes.push(athlete.clone());
        self.save(&athletes).await?;
        Ok(true)
    }

    /// Read-modify-write one athlete while holding the collection lock.
    ///
    /// If `f` returns an error the file is left untouched.
    pub async fn update_athlete<F, R>(&self, athlete_id: u64, mut f: F) -> Result<R, AppError>
    where
        F: FnMut(&mut AthleteRecord) -> Result<R, AppError> + Send,
        R: Send,
    {
        let _guard = self.lock.lock().await;
        let mut athletes = self.load().await?;
        let athlete = athletes
            .iter_mut()
            .find(|a| a.athlete_id == athlete_id)
            .ok_or_else(|| AppError::NotFound(format!("Athlete {}", athlete_id)))?;
        let result = f(athlete)?;
        self.save(&athletes).await?;
        Ok(result)
    }

    pub async fn update_all<F>(&self, mut f: F) -> Result<usize, AppError>
    where
        F: FnMut(&mut AthleteRecord) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut athletes = self.load().await?;
        for athlete in athletes.iter_mut() {
            f(athlete);
        }
        self.save(&athletes).await?;
        Ok(athletes.len())
    }
}
