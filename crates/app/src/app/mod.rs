use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::AppConfig;
use crate::debounce::{DbSummaryUpdater, SummaryDebouncer, SummaryUpdater};
use crate::error::{AppError, Result};
use crate::services::AppServices;
use usage_db::Db;

/// Application state shared by request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    /// Builds the services with the SQLite summary updater. Debounce timers run
    /// on `runtime`.
    pub fn new(config: AppConfig, runtime: Handle) -> Self {
        let config = Arc::new(config);
        let updater = Arc::new(DbSummaryUpdater::new(config.clone()));
        Self::with_updater(config, updater, runtime)
    }

    pub fn with_updater(
        config: Arc<AppConfig>,
        updater: Arc<dyn SummaryUpdater>,
        runtime: Handle,
    ) -> Self {
        let debouncer = SummaryDebouncer::new(updater, config.summary_delay(), runtime);
        let services = AppServices::new(config.clone(), debouncer);
        Self { config, services }
    }

    pub fn is_fresh_db(&self) -> bool {
        !self.config.db_path.exists()
    }

    pub fn setup_db(&self) -> Result<()> {
        if let Some(dir) = self.config.db_path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let mut db = self.open_db()?;
        db.migrate()?;
        Ok(())
    }

    pub fn initialize(&self) -> Result<()> {
        let is_fresh_db = self.is_fresh_db();
        self.setup_db()
            .map_err(|err| AppError::Message(format!("initialize db: {}", err)))?;
        tracing::info!(
            db_path = %self.config.db_path.display(),
            fresh = is_fresh_db,
            "database ready"
        );
        Ok(())
    }

    pub fn open_db(&self) -> Result<Db> {
        Ok(Db::open_with_busy_timeout(
            &self.config.db_path,
            self.config.busy_timeout(),
        )?)
    }

    /// Runs every pending summary update before the process exits.
    pub async fn shutdown(&self) -> usize {
        let flushed = self.services.debouncer.drain().await;
        tracing::info!(flushed, "pending summary updates drained");
        flushed
    }
}
