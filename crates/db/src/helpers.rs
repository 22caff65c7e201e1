use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use usage_core::{Client, Period, PeriodSummary, PeriodType, TokenCounts, User};

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_column(
    row: &Row<'_>,
    idx: usize,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn optional_ts_column(
    row: &Row<'_>,
    idx: usize,
) -> std::result::Result<Option<DateTime<Utc>>, rusqlite::Error> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(idx, &raw).map(Some),
        None => Ok(None),
    }
}

fn parse_ts(idx: usize, raw: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Reads four token columns followed by a cost column, starting at `offset`.
pub(crate) fn totals_from_row(
    row: &Row<'_>,
    offset: usize,
) -> std::result::Result<(TokenCounts, f64), rusqlite::Error> {
    Ok((
        TokenCounts {
            input_tokens: row.get::<_, i64>(offset)?.max(0) as u64,
            output_tokens: row.get::<_, i64>(offset + 1)?.max(0) as u64,
            cache_creation_tokens: row.get::<_, i64>(offset + 2)?.max(0) as u64,
            cache_read_tokens: row.get::<_, i64>(offset + 3)?.max(0) as u64,
        },
        row.get::<_, f64>(offset + 4)?,
    ))
}

pub(crate) fn row_to_user(row: &Row<'_>) -> std::result::Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        billing_day: row.get::<_, i64>(2)?.max(0) as u32,
        created_at: ts_column(row, 3)?,
    })
}

pub(crate) fn row_to_client(row: &Row<'_>) -> std::result::Result<Client, rusqlite::Error> {
    Ok(Client {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        last_sync_at: optional_ts_column(row, 3)?,
        created_at: ts_column(row, 4)?,
    })
}

pub(crate) fn row_to_summary(
    row: &Row<'_>,
) -> std::result::Result<PeriodSummary, rusqlite::Error> {
    let raw_type: String = row.get(1)?;
    let period_type = PeriodType::parse(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown period type {}", raw_type).into(),
        )
    })?;
    let (tokens, cost_usd) = totals_from_row(row, 5)?;
    Ok(PeriodSummary {
        user_id: row.get(0)?,
        period_type,
        period_key: row.get(2)?,
        period_start: ts_column(row, 3)?,
        period_end: ts_column(row, 4)?,
        tokens,
        cost_usd,
    })
}

/// Presentation label for a stored summary.
pub(crate) fn summary_label(summary: &PeriodSummary) -> String {
    match summary.period_type {
        PeriodType::Cycle => Period {
            start: summary.period_start,
            end: summary.period_end,
        }
        .label(),
        PeriodType::Day | PeriodType::Month => summary.period_key.clone(),
    }
}
