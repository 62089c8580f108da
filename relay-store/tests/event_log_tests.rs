use async_trait::async_trait;
use relay_core::{Event, Result};
use relay_store::{EventLog, LegacyMigrator, SessionLocks};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn setup() -> (TempDir, EventLog) {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new(dir.path());
    (dir, log)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_produce_whole_records() {
    let (_dir, log) = setup();
    let appenders = 64;

    let mut handles = Vec::new();
    for i in 0..appenders {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let delta = format!("{i}:{}", "x".repeat(4096));
            log.append("busy", &Event::text_message_content(format!("m{i}"), delta)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let raw = tokio::fs::read_to_string(log.log_path("busy").unwrap()).await.unwrap();
    assert_eq!(raw.lines().count(), appenders);
    for line in raw.lines() {
        serde_json::from_str::<serde_json::Value>(line).expect("every line is a complete object");
    }

    let events = log.load("busy").await.unwrap();
    assert_eq!(events.len(), appenders);
    let ids: HashSet<String> = events
        .iter()
        .map(|e| match e {
            Event::TextMessageContent(c) => c.message_id.clone().unwrap(),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(ids.len(), appenders);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (_dir, log) = setup();
    log.append("a", &Event::run_started("a", "r1")).await.unwrap();
    log.append("b", &Event::run_started("b", "r2")).await.unwrap();
    log.append("b", &Event::run_finished("b", "r2")).await.unwrap();

    assert_eq!(log.load("a").await.unwrap().len(), 1);
    assert_eq!(log.load("b").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_lines_do_not_hide_good_ones() {
    let (_dir, log) = setup();
    log.append("s", &Event::run_started("s", "r")).await.unwrap();

    let path = log.log_path("s").unwrap();
    let mut raw = tokio::fs::read_to_string(&path).await.unwrap();
    raw.push_str("{\"type\":\"TEXT_MESSAGE_START\",\n");
    raw.push_str("garbage\n");
    tokio::fs::write(&path, raw).await.unwrap();

    log.append("s", &Event::run_finished("s", "r")).await.unwrap();

    let events = log.load("s").await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[1].is_run_finished());
}

#[tokio::test]
async fn test_final_record_without_newline_is_loaded() {
    let (_dir, log) = setup();
    let path = log.log_path("s").unwrap();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    let raw = format!(
        "{}\n{}",
        Event::run_started("s", "r").to_json().unwrap(),
        Event::run_finished("s", "r").to_json().unwrap()
    );
    tokio::fs::write(&path, raw).await.unwrap();

    let events = log.load("s").await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[1].is_run_finished());
}

#[tokio::test]
async fn test_load_then_observes_appends_in_lock_order() {
    let (_dir, log) = setup();
    log.append("s", &Event::run_started("s", "r")).await.unwrap();

    let locks = Arc::clone(log.locks());
    let guard = locks.acquire("s").await;

    let writer = {
        let log = log.clone();
        tokio::spawn(async move { log.append("s", &Event::run_finished("s", "r")).await })
    };
    tokio::task::yield_now().await;
    assert!(!writer.is_finished());

    drop(guard);
    writer.await.unwrap().unwrap();
    assert_eq!(log.load("s").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_shared_lock_registry() {
    let dir = TempDir::new().unwrap();
    let locks = Arc::new(SessionLocks::new());
    let log = EventLog::new(dir.path()).with_locks(Arc::clone(&locks));

    log.append("one", &Event::run_started("one", "r")).await.unwrap();
    log.append("two", &Event::run_started("two", "r")).await.unwrap();
    assert_eq!(locks.len(), 2);
}

struct SeedingMigrator {
    calls: AtomicUsize,
}

#[async_trait]
impl LegacyMigrator for SeedingMigrator {
    async fn migrate(&self, session_key: &str, log_path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if session_key != "legacy" {
            return Ok(());
        }
        tokio::fs::create_dir_all(log_path.parent().unwrap()).await?;
        let line = format!("{}\n", Event::run_started("legacy", "old-run").to_json()?);
        tokio::fs::write(log_path, line).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_migrator_runs_only_when_the_log_is_missing() {
    let dir = TempDir::new().unwrap();
    let migrator = Arc::new(SeedingMigrator { calls: AtomicUsize::new(0) });
    let log = EventLog::new(dir.path()).with_migrator(migrator.clone());

    let events = log.load("legacy").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].run_id(), Some("old-run"));
    assert_eq!(migrator.calls.load(Ordering::SeqCst), 1);

    // The log now exists, so the hook is not consulted again.
    log.load("legacy").await.unwrap();
    assert_eq!(migrator.calls.load(Ordering::SeqCst), 1);

    assert!(log.load("fresh").await.unwrap().is_empty());
    assert_eq!(migrator.calls.load(Ordering::SeqCst), 2);
}

struct FailingMigrator;

#[async_trait]
impl LegacyMigrator for FailingMigrator {
    async fn migrate(&self, _session_key: &str, _log_path: &Path) -> Result<()> {
        Err(relay_core::RelayError::Store("legacy format unreadable".into()))
    }
}

#[tokio::test]
async fn test_migration_failure_yields_empty_history() {
    let dir = TempDir::new().unwrap();
    let log = EventLog::new(dir.path()).with_migrator(Arc::new(FailingMigrator));
    assert!(log.load("s").await.unwrap().is_empty());
}
