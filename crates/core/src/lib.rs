use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod period;

pub use period::{
    Period, billing_period, clamp_day, cycle_containing, day_key, day_period,
    is_billing_enabled, last_day_of_month, month_key, month_period, parse_day_key,
    parse_month_key,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_creation_tokens == 0
            && self.cache_read_tokens == 0
    }

    pub fn saturating_add(self, other: TokenCounts) -> TokenCounts {
        TokenCounts {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_add(other.cache_creation_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(other.cache_read_tokens),
        }
    }
}

/// One usage record reported by a sync client.
///
/// `(user_id, client_id, timestamp, session_id, model)` is the natural key; a
/// second event with the same key is dropped on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub user_id: String,
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub project_path: String,
    pub model: String,
    pub tokens: TokenCounts,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Month,
    Cycle,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Month => "month",
            PeriodType::Cycle => "cycle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(PeriodType::Day),
            "month" => Some(PeriodType::Month),
            "cycle" => Some(PeriodType::Cycle),
            _ => None,
        }
    }
}

/// Materialized aggregate for one `(user, period_type, period_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub user_id: String,
    pub period_type: PeriodType,
    pub period_key: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub tokens: TokenCounts,
    pub cost_usd: f64,
}

/// Aggregate row handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedUsage {
    pub period: String,
    pub tokens: TokenCounts,
    pub cost_usd: f64,
}

impl AggregatedUsage {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_zero() && self.cost_usd == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Day of month the billing cycle starts on; 0 disables cycles.
    pub billing_day: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
