use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use usage_core::{
    Period, PeriodSummary, PeriodType, TokenCounts, UsageEvent, cycle_containing,
    day_key, day_period, is_billing_enabled, month_key, month_period, parse_day_key,
};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_ts, row_to_summary, totals_from_row};
use crate::usage::sum_usage_in_range;

const UPSERT_SUMMARY: &str = r#"
    INSERT INTO usage_summary (
      user_id, period_type, period_key, period_start, period_end,
      input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
      cost_usd, updated_at
    ) VALUES (
      ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
    )
    ON CONFLICT(user_id, period_type, period_key) DO UPDATE SET
      period_start = excluded.period_start,
      period_end = excluded.period_end,
      input_tokens = excluded.input_tokens,
      output_tokens = excluded.output_tokens,
      cache_creation_tokens = excluded.cache_creation_tokens,
      cache_read_tokens = excluded.cache_read_tokens,
      cost_usd = excluded.cost_usd,
      updated_at = excluded.updated_at
"#;

/// Number of summary rows rewritten by one update, per period type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryUpdate {
    pub days: usize,
    pub months: usize,
    pub cycles: usize,
}

impl SummaryUpdate {
    pub fn total(&self) -> usize {
        self.days + self.months + self.cycles
    }
}

/// Distinct periods touched by a batch of events, keyed by period key.
#[derive(Debug, Default)]
struct AffectedPeriods {
    days: BTreeMap<String, Period>,
    months: BTreeMap<String, Period>,
    cycles: BTreeMap<String, Period>,
}

impl AffectedPeriods {
    fn from_events(billing_day: u32, events: &[UsageEvent]) -> Result<Self> {
        let mut affected = Self::default();
        for event in events {
            let ts = event.timestamp;
            let date = ts.date_naive();
            affected
                .days
                .entry(day_key(ts))
                .or_insert_with(|| day_period(date));
            let key = month_key(ts);
            if !affected.months.contains_key(&key) {
                let period = month_period(date.year(), date.month())
                    .ok_or_else(|| DbError::InvalidPeriodKey(key.clone()))?;
                affected.months.insert(key, period);
            }
            if let Some(cycle) = cycle_containing(billing_day, date) {
                affected.cycles.entry(cycle.key()).or_insert(cycle);
            }
        }
        Ok(affected)
    }

    fn iter(&self) -> impl Iterator<Item = (PeriodType, &String, &Period)> {
        self.days
            .iter()
            .map(|(key, period)| (PeriodType::Day, key, period))
            .chain(
                self.months
                    .iter()
                    .map(|(key, period)| (PeriodType::Month, key, period)),
            )
            .chain(
                self.cycles
                    .iter()
                    .map(|(key, period)| (PeriodType::Cycle, key, period)),
            )
    }
}

impl Db {
    /// Recomputes only the day, month and cycle summaries touched by `events`.
    ///
    /// Each touched period is re-summed from every stored event in its range, so
    /// late or out-of-order events correct an existing row instead of adding to
    /// it. All upserts share one transaction.
    pub fn update_summaries(
        &mut self,
        user_id: &str,
        billing_day: u32,
        events: &[UsageEvent],
    ) -> Result<SummaryUpdate> {
        if events.is_empty() {
            return Ok(SummaryUpdate::default());
        }
        let affected = AffectedPeriods::from_events(billing_day, events)?;
        let updated_at = format_ts(Utc::now());
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut upsert = tx.prepare(UPSERT_SUMMARY)?;
            for (period_type, key, period) in affected.iter() {
                let (tokens, cost_usd) =
                    sum_usage_in_range(&tx, user_id, period.start, period.end)?;
                upsert.execute(params![
                    user_id,
                    period_type.as_str(),
                    key,
                    format_ts(period.start),
                    format_ts(period.end),
                    tokens.input_tokens as i64,
                    tokens.output_tokens as i64,
                    tokens.cache_creation_tokens as i64,
                    tokens.cache_read_tokens as i64,
                    cost_usd,
                    updated_at,
                ])?;
            }
        }
        tx.commit()?;
        let update = SummaryUpdate {
            days: affected.days.len(),
            months: affected.months.len(),
            cycles: affected.cycles.len(),
        };
        tracing::debug!(
            user_id,
            days = update.days,
            months = update.months,
            cycles = update.cycles,
            "summaries updated"
        );
        Ok(update)
    }

    /// Replaces every cycle summary of a user by re-bucketing the day summaries
    /// under `billing_day`. With billing disabled the cycle rows are only removed.
    pub fn rebuild_cycle_summaries(&mut self, user_id: &str, billing_day: u32) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM usage_summary WHERE user_id = ?1 AND period_type = 'cycle'",
            params![user_id],
        )?;
        if !is_billing_enabled(billing_day) {
            tx.commit()?;
            tracing::info!(user_id, "billing cycles disabled, cycle summaries cleared");
            return Ok(0);
        }
        let cycles = bucket_days_into_cycles(&tx, user_id, billing_day)?;
        let updated_at = format_ts(Utc::now());
        {
            let mut upsert = tx.prepare(UPSERT_SUMMARY)?;
            for (key, (period, tokens, cost_usd)) in &cycles {
                upsert.execute(params![
                    user_id,
                    PeriodType::Cycle.as_str(),
                    key,
                    format_ts(period.start),
                    format_ts(period.end),
                    tokens.input_tokens as i64,
                    tokens.output_tokens as i64,
                    tokens.cache_creation_tokens as i64,
                    tokens.cache_read_tokens as i64,
                    cost_usd,
                    updated_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            user_id,
            billing_day,
            cycles = cycles.len(),
            "cycle summaries rebuilt"
        );
        Ok(cycles.len())
    }

    pub fn get_summary(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_key: &str,
    ) -> Result<Option<PeriodSummary>> {
        self.conn
            .query_row(
                r#"
                SELECT user_id, period_type, period_key, period_start, period_end,
                       input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
                       cost_usd
                FROM usage_summary
                WHERE user_id = ?1 AND period_type = ?2 AND period_key = ?3
                "#,
                params![user_id, period_type.as_str(), period_key],
                row_to_summary,
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Stored summaries of one type, newest first.
    pub fn list_summaries(
        &self,
        user_id: &str,
        period_type: PeriodType,
    ) -> Result<Vec<PeriodSummary>> {
        self.summaries_before(user_id, period_type, None, None, None)
    }

    /// Summaries starting strictly before `before`, optionally at or after
    /// `since`, newest first, at most `limit` rows.
    pub(crate) fn summaries_before(
        &self,
        user_id: &str,
        period_type: PeriodType,
        before: Option<DateTime<Utc>>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<PeriodSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, period_type, period_key, period_start, period_end,
                   input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
                   cost_usd
            FROM usage_summary
            WHERE user_id = ?1
              AND period_type = ?2
              AND (?3 IS NULL OR period_start < ?3)
              AND (?4 IS NULL OR period_start >= ?4)
            ORDER BY period_start DESC
            LIMIT ?5
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![
                    user_id,
                    period_type.as_str(),
                    before.map(format_ts),
                    since.map(format_ts),
                    limit.map(|value| value as i64).unwrap_or(-1),
                ],
                row_to_summary,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_summaries(&self, user_id: &str, period_type: PeriodType) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM usage_summary WHERE user_id = ?1 AND period_type = ?2",
            params![user_id, period_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn bucket_days_into_cycles(
    conn: &Connection,
    user_id: &str,
    billing_day: u32,
) -> Result<BTreeMap<String, (Period, TokenCounts, f64)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT period_key, input_tokens, output_tokens, cache_creation_tokens,
               cache_read_tokens, cost_usd
        FROM usage_summary
        WHERE user_id = ?1 AND period_type = 'day'
        "#,
    )?;
    let days = stmt
        .query_map(params![user_id], |row| {
            let key: String = row.get(0)?;
            let (tokens, cost_usd) = totals_from_row(row, 1)?;
            Ok((key, tokens, cost_usd))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut cycles: BTreeMap<String, (Period, TokenCounts, f64)> = BTreeMap::new();
    for (key, tokens, cost_usd) in days {
        let date = parse_day_key(&key)?;
        let cycle = cycle_containing(billing_day, date)
            .ok_or_else(|| DbError::InvalidPeriodKey(key.clone()))?;
        let entry = cycles
            .entry(cycle.key())
            .or_insert((cycle, TokenCounts::default(), 0.0));
        entry.1 = entry.1.saturating_add(tokens);
        entry.2 += cost_usd;
    }
    Ok(cycles)
}
