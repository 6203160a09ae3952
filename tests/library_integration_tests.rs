//! Durability and concurrency of the experience library

mod common;

use common::{service_with, test_config, ScriptedModel, ASYNC_TIMEOUT_ADD};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use tfgrpo::memory::ExperienceStore;
use tfgrpo::{ErrorKind, ExperienceService};

fn keywords(words: &[&str]) -> BTreeSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[tokio::test]
async fn test_library_survives_restart() {
    let temp = TempDir::new().unwrap();
    let service = service_with(&temp, ScriptedModel::replying(&[ASYNC_TIMEOUT_ADD]));

    let id = service.start_episode("Fix async timeout bug").unwrap();
    let experience_id = service
        .end_episode(&id, "fixed", true, None)
        .await
        .unwrap()
        .experience_id
        .unwrap();
    let before = service.store().get(&experience_id).unwrap();
    service.shutdown().await.unwrap();
    drop(service);

    let reopened = ExperienceService::open(&test_config(&temp), ScriptedModel::replying(&[])).unwrap();
    assert_eq!(reopened.store().get(&experience_id), Some(before));

    let hits = reopened.pull_experiences("asyncio", None).unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_record_layout() {
    let temp = TempDir::new().unwrap();
    let store = ExperienceStore::open(temp.path().join("experiences.json")).unwrap();
    store
        .add("Pin the lockfile", &keywords(&["cargo", "lockfile"]), "commit Cargo.lock", "ep_x")
        .await
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    let entries = json["experiences"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    for field in ["id", "pattern", "keywords", "insight", "created_at", "updated_at", "source_episode_id"] {
        assert!(entries[0].get(field).is_some(), "missing {}", field);
    }
    assert!(!temp.path().join("experiences.json.tmp").exists());
}

#[tokio::test]
async fn test_concurrent_episodes_all_commit() {
    let temp = TempDir::new().unwrap();
    let replies: Vec<&str> = std::iter::repeat(ASYNC_TIMEOUT_ADD).take(12).collect();
    let service = Arc::new(service_with(&temp, ScriptedModel::replying(&replies)));

    let mut handles = Vec::new();
    for i in 0..12 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let id = service.start_episode(&format!("task {}", i)).unwrap();
            service.log_attempt(&id, "try", Some("ValueError: bad"), false).unwrap();
            service.end_episode(&id, "done", true, None).await.unwrap()
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().experience_id.unwrap());
    }

    assert_eq!(ids.len(), 12);
    assert_eq!(service.store().len(), 12);

    let reloaded = ExperienceStore::open(temp.path().join("experiences.json")).unwrap();
    assert_eq!(reloaded.len(), 12);
}

#[tokio::test]
async fn test_store_errors_are_distinct() {
    let temp = TempDir::new().unwrap();
    let store = ExperienceStore::open(temp.path().join("experiences.json")).unwrap();

    let err = store.delete("exp_missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.add("  ", &keywords(&["x"]), "", "ep").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    std::fs::write(temp.path().join("broken.json"), "not json").unwrap();
    let err = ExperienceStore::open(temp.path().join("broken.json")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn test_storage_failure_during_end_episode_rolls_back() {
    let temp = TempDir::new().unwrap();
    let service = service_with(&temp, ScriptedModel::replying(&[ASYNC_TIMEOUT_ADD, ASYNC_TIMEOUT_ADD]));

    let first = service.start_episode("Fix async timeout bug").unwrap();
    service.end_episode(&first, "fixed", true, None).await.unwrap();
    let record = temp.path().join("experiences.json");
    let before = std::fs::read(&record).unwrap();

    // An occupied directory at the temp path makes the next write fail.
    let blocker = temp.path().join("experiences.json.tmp");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("occupied"), b"x").unwrap();

    let second = service.start_episode("Fix another async timeout").unwrap();
    let err = service.end_episode(&second, "fixed", true, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(service.store().len(), 1);
    assert_eq!(std::fs::read(&record).unwrap(), before);
    assert_eq!(service.stats().library_commits, 1);
    assert_eq!(service.stats().library_rollbacks, 1);
    assert!(!service.episode(&second).unwrap().is_active());
}
