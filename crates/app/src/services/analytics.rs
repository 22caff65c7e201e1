use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::services::{SharedConfig, open_db, require_user};
use usage_core::AggregatedUsage;
use usage_db::Db;

/// Read side: summarized history merged with the live open period.
#[derive(Clone)]
pub struct AnalyticsService {
    config: SharedConfig,
}

impl AnalyticsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn usage_by_day(&self, user_id: &str) -> Result<Vec<AggregatedUsage>> {
        self.usage_by_day_at(user_id, Utc::now())
    }

    pub fn usage_by_day_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregatedUsage>> {
        let db = self.db()?;
        let user = require_user(&db, user_id)?;
        Ok(db.usage_by_day(user_id, user.billing_day, now, self.config.day_history_limit)?)
    }

    pub fn usage_by_month(&self, user_id: &str) -> Result<Vec<AggregatedUsage>> {
        self.usage_by_month_at(user_id, Utc::now())
    }

    pub fn usage_by_month_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregatedUsage>> {
        let db = self.db()?;
        require_user(&db, user_id)?;
        Ok(db.usage_by_month(user_id, now, self.config.month_history_limit)?)
    }

    pub fn usage_by_cycle(&self, user_id: &str) -> Result<Vec<AggregatedUsage>> {
        self.usage_by_cycle_at(user_id, Utc::now())
    }

    pub fn usage_by_cycle_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregatedUsage>> {
        let db = self.db()?;
        let user = require_user(&db, user_id)?;
        Ok(db.usage_by_cycle(user_id, user.billing_day, now)?)
    }

    pub fn total_usage(&self, user_id: &str) -> Result<AggregatedUsage> {
        self.total_usage_at(user_id, Utc::now())
    }

    pub fn total_usage_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<AggregatedUsage> {
        let db = self.db()?;
        let user = require_user(&db, user_id)?;
        Ok(db.total_usage(user_id, user.billing_day, now)?)
    }
}
