use chrono::{DateTime, Datelike, Utc};
use rusqlite::params;
use usage_core::{
    AggregatedUsage, Period, PeriodSummary, PeriodType, billing_period, day_key,
    day_period, month_key, month_period,
};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_ts, summary_label, totals_from_row};
use crate::usage::sum_usage_in_range;

pub const DEFAULT_DAY_HISTORY: usize = 30;
pub const DEFAULT_MONTH_HISTORY: usize = 12;

impl Db {
    /// Daily usage, newest first: today computed live, earlier days from
    /// summaries. With billing enabled only days of the current cycle are listed.
    pub fn usage_by_day(
        &self,
        user_id: &str,
        billing_day: u32,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AggregatedUsage>> {
        let today = day_period(now.date_naive());
        let since = billing_period(billing_day, now).map(|period| period.start);
        let history = self.summaries_before(
            user_id,
            PeriodType::Day,
            Some(today.start),
            since,
            Some(limit),
        )?;
        self.with_live_period(user_id, day_key(now), &today, history)
    }

    /// Monthly usage, newest first, with the current month computed live.
    pub fn usage_by_month(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AggregatedUsage>> {
        let date = now.date_naive();
        let current = month_period(date.year(), date.month())
            .ok_or_else(|| DbError::InvalidPeriodKey(month_key(now)))?;
        let history = self.summaries_before(
            user_id,
            PeriodType::Month,
            Some(current.start),
            None,
            Some(limit),
        )?;
        self.with_live_period(user_id, month_key(now), &current, history)
    }

    /// Usage per billing cycle, newest first. Empty when billing is disabled.
    pub fn usage_by_cycle(
        &self,
        user_id: &str,
        billing_day: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregatedUsage>> {
        let Some(current) = billing_period(billing_day, now) else {
            return Ok(Vec::new());
        };
        let history =
            self.summaries_before(user_id, PeriodType::Cycle, Some(current.start), None, None)?;
        self.with_live_period(user_id, current.label(), &current, history)
    }

    /// Total usage: summarized days plus today, limited to the current billing
    /// cycle when one is configured.
    pub fn total_usage(
        &self,
        user_id: &str,
        billing_day: u32,
        now: DateTime<Utc>,
    ) -> Result<AggregatedUsage> {
        let today = day_period(now.date_naive());
        let since = billing_period(billing_day, now).map(|period| format_ts(period.start));
        let (summarized_tokens, summarized_cost) = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0),
                   COALESCE(SUM(cache_creation_tokens), 0), COALESCE(SUM(cache_read_tokens), 0),
                   COALESCE(SUM(cost_usd), 0.0)
            FROM usage_summary
            WHERE user_id = ?1
              AND period_type = 'day'
              AND period_start < ?2
              AND (?3 IS NULL OR period_start >= ?3)
            "#,
            params![user_id, format_ts(today.start), since],
            |row| totals_from_row(row, 0),
        )?;
        let (live_tokens, live_cost) =
            sum_usage_in_range(&self.conn, user_id, today.start, today.end)?;
        Ok(AggregatedUsage {
            period: "Total".to_string(),
            tokens: summarized_tokens.saturating_add(live_tokens),
            cost_usd: summarized_cost + live_cost,
        })
    }

    fn with_live_period(
        &self,
        user_id: &str,
        label: String,
        period: &Period,
        history: Vec<PeriodSummary>,
    ) -> Result<Vec<AggregatedUsage>> {
        let (tokens, cost_usd) =
            sum_usage_in_range(&self.conn, user_id, period.start, period.end)?;
        let live = AggregatedUsage {
            period: label,
            tokens,
            cost_usd,
        };
        let mut results = Vec::with_capacity(history.len() + 1);
        if !live.is_empty() {
            results.push(live);
        }
        results.extend(history.into_iter().map(|summary| AggregatedUsage {
            period: summary_label(&summary),
            tokens: summary.tokens,
            cost_usd: summary.cost_usd,
        }));
        Ok(results)
    }
}
