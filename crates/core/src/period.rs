//! Calendar and billing-cycle arithmetic.
//!
//! All periods are UTC and inclusive on both ends: a period ends one
//! millisecond (the storage resolution) before the next one starts.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";
const MONTH_KEY_FORMAT: &str = "%Y-%m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// Start date as `YYYY-MM-DD`; used as the key of a billing cycle.
    pub fn key(&self) -> String {
        self.start.format(DAY_KEY_FORMAT).to_string()
    }

    /// Display label such as `Jan 15 – Feb 14`.
    pub fn label(&self) -> String {
        format!("{} – {}", self.start.format("%b %-d"), self.end.format("%b %-d"))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

pub fn is_billing_enabled(anchor_day: u32) -> bool {
    (1..=31).contains(&anchor_day)
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    // Day 0 of the following month.
    let (next_year, next_month) = next_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

pub fn clamp_day(year: i32, month: u32, day: u32) -> u32 {
    day.min(last_day_of_month(year, month))
}

/// Current billing period for `anchor_day`, or `None` when cycles are disabled.
pub fn billing_period(anchor_day: u32, now: DateTime<Utc>) -> Option<Period> {
    cycle_containing(anchor_day, now.date_naive())
}

/// Billing cycle that holds `date`.
pub fn cycle_containing(anchor_day: u32, date: NaiveDate) -> Option<Period> {
    if !is_billing_enabled(anchor_day) {
        return None;
    }
    let (year, month) = (date.year(), date.month());
    let (start_year, start_month) = if date.day() >= clamp_day(year, month, anchor_day) {
        (year, month)
    } else {
        prev_month(year, month)
    };
    let start = NaiveDate::from_ymd_opt(
        start_year,
        start_month,
        clamp_day(start_year, start_month, anchor_day),
    )?;
    let (end_year, end_month) = next_month(start_year, start_month);
    let next_start = NaiveDate::from_ymd_opt(
        end_year,
        end_month,
        clamp_day(end_year, end_month, anchor_day),
    )?;
    Some(Period {
        start: midnight(start),
        end: midnight(next_start) - one_unit(),
    })
}

pub fn day_period(date: NaiveDate) -> Period {
    let start = midnight(date);
    Period {
        start,
        end: start + Duration::days(1) - one_unit(),
    }
}

pub fn month_period(year: i32, month: u32) -> Option<Period> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_month(year, month);
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some(Period {
        start: midnight(first),
        end: midnight(next_first) - one_unit(),
    })
}

pub fn day_key(ts: DateTime<Utc>) -> String {
    ts.format(DAY_KEY_FORMAT).to_string()
}

pub fn month_key(ts: DateTime<Utc>) -> String {
    ts.format(MONTH_KEY_FORMAT).to_string()
}

pub fn parse_day_key(key: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT)
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month_key(key: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(&format!("{}-01", key), DAY_KEY_FORMAT)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn one_unit() -> Duration {
    Duration::milliseconds(1)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}
