use chrono::Utc;

use crate::error::Result;
use crate::services::{SharedConfig, missing_user, open_db, require_user};
use usage_core::{Period, billing_period};
use usage_db::Db;

/// Billing settings of one user.
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    pub billing_day: u32,
    pub current_cycle: Option<Period>,
}

#[derive(Clone)]
pub struct SettingsService {
    config: SharedConfig,
}

impl SettingsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn get(&self, user_id: &str) -> Result<SettingsSnapshot> {
        let db = self.db()?;
        let user = require_user(&db, user_id)?;
        Ok(SettingsSnapshot {
            billing_day: user.billing_day,
            current_cycle: billing_period(user.billing_day, Utc::now()),
        })
    }

    /// Stores a new billing anchor and rebuilds the cycle summaries under it.
    ///
    /// `None` disables billing cycles; any other value is clamped to 1..=31.
    /// Returns the anchor that was stored.
    pub fn update_billing_anchor(&self, user_id: &str, billing_day: Option<i64>) -> Result<u32> {
        let billing_day = normalize_billing_day(billing_day);
        let mut db = self.db()?;
        if !db.update_billing_anchor(user_id, billing_day)? {
            return Err(missing_user());
        }
        let cycles = db.rebuild_cycle_summaries(user_id, billing_day)?;
        tracing::info!(user_id, billing_day, cycles, "billing anchor updated");
        Ok(billing_day)
    }
}

fn normalize_billing_day(billing_day: Option<i64>) -> u32 {
    match billing_day {
        None => 0,
        Some(day) => day.clamp(1, 31) as u32,
    }
}
