//! Per-user coalescing of summary recomputation.
//!
//! Every sync that inserts rows schedules a recompute for its user. Calls that
//! arrive within the quiet period are merged into one pending record, and each
//! call stamps it with a fresh generation. Each call arms its own timer tagged
//! with the generation it produced; a timer whose generation is no longer
//! current finds nothing to do. Generations come from one counter shared by all
//! users and are never reused, so a timer that outlives its record cannot
//! match a later one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use usage_core::UsageEvent;
use usage_db::{Db, SummaryUpdate};

use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// Target of a flushed recompute.
pub trait SummaryUpdater: Send + Sync + 'static {
    fn update_summaries(
        &self,
        user_id: &str,
        billing_day: u32,
        events: &[UsageEvent],
    ) -> Result<SummaryUpdate>;
}

/// Writes summaries to the configured SQLite database.
pub struct DbSummaryUpdater {
    config: Arc<AppConfig>,
}

impl DbSummaryUpdater {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl SummaryUpdater for DbSummaryUpdater {
    fn update_summaries(
        &self,
        user_id: &str,
        billing_day: u32,
        events: &[UsageEvent],
    ) -> Result<SummaryUpdate> {
        let mut db = Db::open_with_busy_timeout(&self.config.db_path, self.config.busy_timeout())?;
        Ok(db.update_summaries(user_id, billing_day, events)?)
    }
}

#[derive(Debug)]
struct PendingRecompute {
    generation: u64,
    billing_day: u32,
    events: Vec<UsageEvent>,
}

#[derive(Debug, Default)]
struct PendingTable {
    last_generation: u64,
    records: HashMap<String, PendingRecompute>,
}

struct Inner {
    updater: Arc<dyn SummaryUpdater>,
    delay: Duration,
    runtime: Handle,
    pending: Mutex<PendingTable>,
}

#[derive(Clone)]
pub struct SummaryDebouncer {
    inner: Arc<Inner>,
}

impl SummaryDebouncer {
    pub fn new(updater: Arc<dyn SummaryUpdater>, delay: Duration, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                updater,
                delay,
                runtime,
                pending: Mutex::new(PendingTable::default()),
            }),
        }
    }

    /// Queues `events` for `user_id` and re-arms the quiet period.
    ///
    /// The latest `billing_day` wins. Returns the generation the new timer
    /// carries.
    pub fn schedule(&self, user_id: &str, billing_day: u32, events: Vec<UsageEvent>) -> u64 {
        let generation = {
            let mut pending = self.lock_pending();
            pending.last_generation += 1;
            let generation = pending.last_generation;
            let entry = pending
                .records
                .entry(user_id.to_string())
                .or_insert_with(|| PendingRecompute {
                    generation,
                    billing_day,
                    events: Vec::new(),
                });
            entry.generation = generation;
            entry.billing_day = billing_day;
            entry.events.extend(events);
            generation
        };

        let debouncer = self.clone();
        let user_id = user_id.to_string();
        let delay = self.inner.delay;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debouncer.flush(&user_id, generation).await;
        });
        generation
    }

    /// Runs the pending recompute for `user_id` if `generation` is still the
    /// current one. Returns whether a recompute ran.
    pub async fn flush(&self, user_id: &str, generation: u64) -> bool {
        let taken = {
            let mut pending = self.lock_pending();
            let current = pending.records.get(user_id).map(|record| record.generation);
            if current == Some(generation) {
                pending.records.remove(user_id)
            } else {
                None
            }
        };
        let Some(record) = taken else {
            tracing::debug!(user_id, generation, "stale summary flush ignored");
            return false;
        };
        self.run(user_id.to_string(), record).await;
        true
    }

    /// Flushes every pending record now. Timers still armed for drained users
    /// become no-ops.
    pub async fn drain(&self) -> usize {
        let drained: Vec<(String, PendingRecompute)> =
            self.lock_pending().records.drain().collect();
        let count = drained.len();
        for (user_id, record) in drained {
            self.run(user_id, record).await;
        }
        count
    }

    pub fn pending_users(&self) -> usize {
        self.lock_pending().records.len()
    }

    async fn run(&self, user_id: String, record: PendingRecompute) {
        let updater = Arc::clone(&self.inner.updater);
        let events_len = record.events.len();
        let task_user = user_id.clone();
        let outcome = self
            .inner
            .runtime
            .spawn_blocking(move || {
                updater.update_summaries(&task_user, record.billing_day, &record.events)
            })
            .await
            .map_err(|err| AppError::Message(format!("summary task: {}", err)))
            .and_then(|result| result);
        match outcome {
            Ok(update) => tracing::info!(
                user_id = %user_id,
                events = events_len,
                periods = update.total(),
                "summary flush complete"
            ),
            Err(err) => tracing::error!(
                user_id = %user_id,
                events = events_len,
                error = %err,
                "summary flush failed"
            ),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
