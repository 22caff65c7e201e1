mod analytics;
mod settings;
mod sync;
mod users;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::debounce::SummaryDebouncer;
use crate::error::{AppError, Result};
use usage_core::User;
use usage_db::Db;

pub use analytics::AnalyticsService;
pub use settings::{SettingsService, SettingsSnapshot};
pub use sync::{SyncBatch, SyncOutcome, SyncRecord, SyncService};
pub use users::UsersService;

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub analytics: AnalyticsService,
    pub settings: SettingsService,
    pub sync: SyncService,
    pub users: UsersService,
    pub debouncer: SummaryDebouncer,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>, debouncer: SummaryDebouncer) -> Self {
        Self {
            analytics: AnalyticsService::new(config.clone()),
            settings: SettingsService::new(config.clone()),
            sync: SyncService::new(config.clone(), debouncer.clone()),
            users: UsersService::new(config),
            debouncer,
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open_with_busy_timeout(&config.db_path, config.busy_timeout())?)
}

fn require_user(db: &Db, user_id: &str) -> Result<User> {
    db.get_user(user_id)?.ok_or_else(missing_user)
}

fn missing_user() -> AppError {
    AppError::NotFound("user not found".to_string())
}
