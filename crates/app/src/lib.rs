pub mod app;
pub mod config;
pub mod debounce;
pub mod error;
pub mod services;

pub use app::AppState;
pub use config::AppConfig;
pub use debounce::{DbSummaryUpdater, SummaryDebouncer, SummaryUpdater};
pub use error::{ApiError, AppError, Result};
pub use services::{AppServices, SettingsSnapshot, SyncBatch, SyncOutcome, SyncRecord};
