#![allow(dead_code)]

use std::sync::{Arc, Mutex, mpsc};

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::runtime::Handle;
use usage_app::{AppConfig, AppError, AppState, SummaryUpdater, SyncBatch, SyncRecord};
use usage_core::{TokenCounts, UsageEvent};
use usage_db::SummaryUpdate;

pub struct TestApp {
    pub _dir: TempDir,
    pub state: AppState,
}

/// Migrated app state over a fresh database; must run inside a tokio runtime.
pub fn setup_app(summary_delay_ms: u64) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = AppConfig::new(dir.path().join("data").join("usage.sqlite"));
    config.summary_delay_ms = summary_delay_ms;
    let state = AppState::new(config, Handle::current());
    state.initialize().expect("initialize");
    TestApp { _dir: dir, state }
}

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("rfc3339")
        .with_timezone(&Utc)
}

pub fn record(timestamp: &str, session_id: &str, cost_usd: f64) -> SyncRecord {
    SyncRecord {
        timestamp: timestamp.to_string(),
        session_id: session_id.to_string(),
        project_path: "/work/project".to_string(),
        model: "claude-sonnet-4".to_string(),
        input_tokens: 100,
        output_tokens: 50,
        cache_creation_tokens: 0,
        cache_read_tokens: 0,
        cost_usd,
    }
}

pub fn batch(client_id: &str, records: Vec<SyncRecord>) -> SyncBatch {
    SyncBatch {
        client_id: client_id.to_string(),
        client_name: String::new(),
        records,
    }
}

pub fn event(user_id: &str, timestamp: &str) -> UsageEvent {
    UsageEvent {
        user_id: user_id.to_string(),
        client_id: "laptop".to_string(),
        timestamp: ts(timestamp),
        session_id: "s1".to_string(),
        project_path: "/work/project".to_string(),
        model: "claude-sonnet-4".to_string(),
        tokens: TokenCounts {
            input_tokens: 10,
            output_tokens: 5,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        },
        cost_usd: 0.5,
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub user_id: String,
    pub billing_day: u32,
    pub events: Vec<UsageEvent>,
}

/// Updater that remembers every call instead of touching a database.
#[derive(Default)]
pub struct RecordingUpdater {
    calls: Mutex<Vec<RecordedCall>>,
    fail: bool,
}

impl RecordingUpdater {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl SummaryUpdater for RecordingUpdater {
    fn update_summaries(
        &self,
        user_id: &str,
        billing_day: u32,
        events: &[UsageEvent],
    ) -> usage_app::Result<SummaryUpdate> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            user_id: user_id.to_string(),
            billing_day,
            events: events.to_vec(),
        });
        if self.fail {
            return Err(AppError::Message("summary store unavailable".to_string()));
        }
        Ok(SummaryUpdate {
            days: events.len(),
            ..SummaryUpdate::default()
        })
    }
}

pub fn recording() -> Arc<RecordingUpdater> {
    Arc::new(RecordingUpdater::default())
}

/// Updater that parks while handling `gated_user` until released.
pub struct GatedUpdater {
    gated_user: String,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
    users: Mutex<Vec<String>>,
}

impl GatedUpdater {
    /// Returns the updater, a receiver signalled when the gated update starts,
    /// and the sender that lets it finish.
    pub fn new(gated_user: &str) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let updater = Self {
            gated_user: gated_user.to_string(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            users: Mutex::new(Vec::new()),
        };
        (updater, entered_rx, release_tx)
    }

    pub fn users(&self) -> Vec<String> {
        self.users.lock().expect("users lock").clone()
    }
}

impl SummaryUpdater for GatedUpdater {
    fn update_summaries(
        &self,
        user_id: &str,
        _billing_day: u32,
        _events: &[UsageEvent],
    ) -> usage_app::Result<SummaryUpdate> {
        if user_id == self.gated_user {
            self.entered
                .lock()
                .expect("entered lock")
                .send(())
                .expect("signal entered");
            self.release
                .lock()
                .expect("release lock")
                .recv()
                .expect("wait for release");
        }
        self.users.lock().expect("users lock").push(user_id.to_string());
        Ok(SummaryUpdate::default())
    }
}
