use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::debounce::SummaryDebouncer;
use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db, require_user};
use usage_core::{TokenCounts, UsageEvent};
use usage_db::Db;

/// Latest year whose billing cycles still end in a four-digit year; stored
/// timestamps only sort correctly as text within that range.
const MAX_EVENT_YEAR: i32 = 9998;
/// SQLite integers are signed.
const MAX_TOKEN_COUNT: u64 = i64::MAX as u64;

/// One usage record as reported by a sync client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// RFC 3339 timestamp; records that fail to parse are dropped.
    pub timestamp: String,
    pub session_id: String,
    #[serde(default)]
    pub project_path: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub client_id: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub records: Vec<SyncRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub received: usize,
    pub accepted: usize,
    pub inserted: usize,
}

/// Ingestion boundary: stores a client's batch and queues the summary refresh.
#[derive(Clone)]
pub struct SyncService {
    config: SharedConfig,
    debouncer: SummaryDebouncer,
}

impl SyncService {
    pub(super) fn new(config: SharedConfig, debouncer: SummaryDebouncer) -> Self {
        Self { config, debouncer }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn sync(&self, user_id: &str, batch: SyncBatch) -> Result<SyncOutcome> {
        let client_id = batch.client_id.trim();
        if client_id.is_empty() {
            return Err(AppError::InvalidInput("client_id is required".to_string()));
        }
        let received = batch.records.len();
        if received == 0 {
            return Ok(SyncOutcome::default());
        }

        let mut db = self.db()?;
        let user = require_user(&db, user_id)?;
        let client_name = match batch.client_name.trim() {
            "" => client_id,
            name => name,
        };
        db.get_or_create_client(user_id, client_id, client_name)?;

        let events: Vec<UsageEvent> = batch
            .records
            .iter()
            .filter_map(|record| to_event(user_id, client_id, record))
            .collect();
        let inserted = db.insert_usage_events(&events)?;
        let accepted = events.len();
        if inserted > 0 {
            self.debouncer.schedule(user_id, user.billing_day, events);
        }
        db.update_client_last_sync(user_id, client_id, Utc::now())?;

        tracing::debug!(user_id, client_id, received, accepted, inserted, "sync stored");
        Ok(SyncOutcome {
            received,
            accepted,
            inserted,
        })
    }

    pub fn sync_status(&self, user_id: &str, client_id: &str) -> Result<Option<DateTime<Utc>>> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(AppError::InvalidInput("client_id is required".to_string()));
        }
        let db = self.db()?;
        Ok(db.client_sync_status(user_id, client_id)?)
    }
}

fn to_event(user_id: &str, client_id: &str, record: &SyncRecord) -> Option<UsageEvent> {
    let timestamp = match DateTime::parse_from_rfc3339(record.timestamp.trim()) {
        Ok(value) => value.with_timezone(&Utc),
        Err(err) => {
            tracing::debug!(
                user_id,
                client_id,
                timestamp = %record.timestamp,
                error = %err,
                "dropping record with malformed timestamp"
            );
            return None;
        }
    };
    let tokens = TokenCounts {
        input_tokens: record.input_tokens,
        output_tokens: record.output_tokens,
        cache_creation_tokens: record.cache_creation_tokens,
        cache_read_tokens: record.cache_read_tokens,
    };
    let counts = [
        tokens.input_tokens,
        tokens.output_tokens,
        tokens.cache_creation_tokens,
        tokens.cache_read_tokens,
    ];
    let oversized = counts.iter().any(|count| *count > MAX_TOKEN_COUNT);
    if timestamp.year() > MAX_EVENT_YEAR || oversized {
        tracing::debug!(
            user_id,
            client_id,
            timestamp = %record.timestamp,
            "dropping record outside the storable range"
        );
        return None;
    }
    Some(UsageEvent {
        user_id: user_id.to_string(),
        client_id: client_id.to_string(),
        timestamp,
        session_id: record.session_id.clone(),
        project_path: record.project_path.clone(),
        model: record.model.clone(),
        tokens,
        cost_usd: record.cost_usd,
    })
}
