// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running, with
//! FIRESTORE_EMULATOR_HOST pointing at it. They are skipped otherwise.

use challenge_tracker::db::AthleteStore;
use challenge_tracker::error::AppError;
use challenge_tracker::models::Verdict;
use challenge_tracker::services::WeekResultCache;

mod common;
use common::{test_athlete, test_athlete_with_results, test_db};

/// Generate a unique athlete ID for test isolation.
fn unique_athlete_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

#[tokio::test]
async fn test_upsert_and_get_athlete() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();

    assert!(db.get_athlete(athlete_id).await.unwrap().is_none());

    let athlete = test_athlete_with_results(athlete_id, &[(1, Verdict::Passed)]);
    db.upsert_athlete(&athlete).await.unwrap();

    let stored = db.get_athlete(athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.athlete_id, athlete_id);
    assert_eq!(stored.rules, athlete.rules);
    assert_eq!(stored.verdict(1), Some(Verdict::Passed));
}

#[tokio::test]
async fn test_update_athlete_in_transaction() {
    require_emulator!();

    let store = AthleteStore::Firestore(test_db().await);
    let athlete_id = unique_athlete_id();
    store.upsert_athlete(&test_athlete(athlete_id)).await.unwrap();

    let cache = WeekResultCache::new(store.clone());
    cache.put(athlete_id, 4, Verdict::Failed).await.unwrap();
    cache.put(athlete_id, 5, Verdict::Exempt).await.unwrap();
    assert!(cache.clear_week(athlete_id, 4).await.unwrap());

    let stored = store.get_athlete(athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.verdict(4), None);
    assert_eq!(stored.verdict(5), Some(Verdict::Exempt));

    // A failing closure leaves the document untouched
    let result: Result<(), AppError> = store
        .update_athlete(athlete_id, |athlete| {
            athlete.jokers_remaining = 9;
            Err(AppError::BadRequest("rejected".to_string()))
        })
        .await;
    assert!(result.is_err());
    let stored = store.get_athlete(athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.jokers_remaining, 1);
}

#[tokio::test]
async fn test_concurrent_updates_are_not_lost() {
    require_emulator!();

    let store = AthleteStore::Firestore(test_db().await);
    let athlete_id = unique_athlete_id();
    store.upsert_athlete(&test_athlete(athlete_id)).await.unwrap();
    let cache = WeekResultCache::new(store.clone());

    let mut handles = Vec::new();
    for week in 1..=8u32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.put(athlete_id, week, Verdict::Passed).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get_athlete(athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.week_results.len(), 8);
}

#[tokio::test]
async fn test_create_athlete_keeps_existing_document() {
    require_emulator!();

    let store = AthleteStore::Firestore(test_db().await);
    let athlete_id = unique_athlete_id();
    let mut athlete = test_athlete(athlete_id);
    assert!(store.create_athlete(&athlete).await.unwrap());

    athlete.jokers_remaining = 5;
    assert!(!store.create_athlete(&athlete).await.unwrap());
    let stored = store.get_athlete(athlete_id).await.unwrap().unwrap();
    assert_eq!(stored.jokers_remaining, 1);
}

#[tokio::test]
async fn test_update_missing_athlete_is_not_found() {
    require_emulator!();

    let store = AthleteStore::Firestore(test_db().await);
    let result = store
        .update_athlete(unique_athlete_id(), |athlete| {
            athlete.jokers_remaining = 0;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_find_by_chat_user() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();
    let chat_user_id = format!("chat-{}", athlete_id);

    let mut athlete = test_athlete(athlete_id);
    athlete.chat_user_id = Some(chat_user_id.clone());
    db.upsert_athlete(&athlete).await.unwrap();

    let found = db.find_by_chat_user(&chat_user_id).await.unwrap().unwrap();
    assert_eq!(found.athlete_id, athlete_id);
    assert!(db
        .find_by_chat_user("chat-nobody-has")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_clear_all_verdicts_for_one_athlete() {
    require_emulator!();

    let store = AthleteStore::Firestore(test_db().await);
    let first = unique_athlete_id();
    let second = first + 1;
    let results = [(1, Verdict::Failed), (2, Verdict::Passed)];
    store
        .upsert_athlete(&test_athlete_with_results(first, &results))
        .await
        .unwrap();
    store
        .upsert_athlete(&test_athlete_with_results(second, &results))
        .await
        .unwrap();

    let cleared = WeekResultCache::new(store.clone())
        .clear_all(first)
        .await
        .unwrap();
    assert_eq!(cleared, 2);

    let stored = store.get_athlete(first).await.unwrap().unwrap();
    assert!(stored.week_results.is_empty());
    let untouched = store.get_athlete(second).await.unwrap().unwrap();
    assert_eq!(untouched.week_results.len(), 2);
}
