use chrono::{DateTime, Datelike, Utc};
use rusqlite::{Connection, TransactionBehavior, params};
use usage_core::{
    TokenCounts, UsageEvent, day_period, month_period, parse_day_key, parse_month_key,
};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_ts, totals_from_row};

impl Db {
    /// Inserts a batch atomically and returns how many rows were new.
    ///
    /// Events whose natural key is already stored are skipped silently.
    pub fn insert_usage_events(&mut self, events: &[UsageEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO usage_event (
                  user_id, client_id, ts, session_id, project_path, model,
                  input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens,
                  cost_usd
                ) VALUES (
                  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
                )
                "#,
            )?;
            for event in events {
                let rows = stmt.execute(params![
                    event.user_id,
                    event.client_id,
                    format_ts(event.timestamp),
                    event.session_id,
                    event.project_path,
                    event.model,
                    event.tokens.input_tokens as i64,
                    event.tokens.output_tokens as i64,
                    event.tokens.cache_creation_tokens as i64,
                    event.tokens.cache_read_tokens as i64,
                    event.cost_usd,
                ])?;
                if rows > 0 {
                    inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Sums a user's events with `start <= ts <= end`.
    pub fn usage_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(TokenCounts, f64)> {
        sum_usage_in_range(&self.conn, user_id, start, end)
    }

    /// Sums a user's events for a `YYYY-MM-DD` day key.
    pub fn usage_for_day(&self, user_id: &str, day_key: &str) -> Result<(TokenCounts, f64)> {
        let period = day_period(parse_day_key(day_key)?);
        sum_usage_in_range(&self.conn, user_id, period.start, period.end)
    }

    /// Sums a user's events for a `YYYY-MM` month key.
    pub fn usage_for_month(&self, user_id: &str, month_key: &str) -> Result<(TokenCounts, f64)> {
        let first = parse_month_key(month_key)?;
        let period = month_period(first.year(), first.month())
            .ok_or_else(|| DbError::InvalidPeriodKey(month_key.to_string()))?;
        sum_usage_in_range(&self.conn, user_id, period.start, period.end)
    }

    pub fn count_usage_events(&self, user_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM usage_event WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub(crate) fn sum_usage_in_range(
    conn: &Connection,
    user_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(TokenCounts, f64)> {
    let totals = conn.query_row(
        r#"
        SELECT COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0),
               COALESCE(SUM(cache_creation_tokens), 0), COALESCE(SUM(cache_read_tokens), 0),
               COALESCE(SUM(cost_usd), 0.0)
        FROM usage_event
        WHERE user_id = ?1 AND ts >= ?2 AND ts <= ?3
        "#,
        params![user_id, format_ts(start), format_ts(end)],
        |row| totals_from_row(row, 0),
    )?;
    Ok(totals)
}
