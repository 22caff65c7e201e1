#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use usage_core::{TokenCounts, UsageEvent};
use usage_db::Db;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn setup_user(db: &mut Db, id: &str) {
    db.create_user(id, &format!("{}-name", id)).expect("create user");
}

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("rfc3339")
        .with_timezone(&Utc)
}

pub fn tokens(input: u64, output: u64) -> TokenCounts {
    TokenCounts {
        input_tokens: input,
        output_tokens: output,
        cache_creation_tokens: 0,
        cache_read_tokens: 0,
    }
}

pub fn make_event(user_id: &str, timestamp: &str, session_id: &str, cost_usd: f64) -> UsageEvent {
    UsageEvent {
        user_id: user_id.to_string(),
        client_id: "laptop".to_string(),
        timestamp: ts(timestamp),
        session_id: session_id.to_string(),
        project_path: "/work/project".to_string(),
        model: "claude-sonnet-4".to_string(),
        tokens: tokens(100, 50),
        cost_usd,
    }
}

/// Inserts events and folds them into summaries, as one sync would.
pub fn ingest(db: &mut Db, user_id: &str, billing_day: u32, events: Vec<UsageEvent>) -> usize {
    let inserted = db.insert_usage_events(&events).expect("insert events");
    db.update_summaries(user_id, billing_day, &events)
        .expect("update summaries");
    inserted
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {} got {}",
        expected,
        actual
    );
}
