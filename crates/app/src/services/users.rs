use crate::error::{AppError, Result};
use crate::services::{SharedConfig, missing_user, open_db, require_user};
use usage_core::{Client, User};
use usage_db::Db;

#[derive(Clone)]
pub struct UsersService {
    config: SharedConfig,
}

impl UsersService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn create(&self, id: &str, username: &str) -> Result<User> {
        let (id, username) = (id.trim(), username.trim());
        if id.is_empty() || username.is_empty() {
            return Err(AppError::InvalidInput(
                "user id and username are required".to_string(),
            ));
        }
        let db = self.db()?;
        if db.get_user_by_username(username)?.is_some() {
            return Err(AppError::InvalidInput(format!("username {} is taken", username)));
        }
        Ok(db.create_user(id, username)?)
    }

    pub fn get(&self, id: &str) -> Result<User> {
        let db = self.db()?;
        require_user(&db, id)
    }

    pub fn find_by_username(&self, username: &str) -> Result<User> {
        let db = self.db()?;
        db.get_user_by_username(username)?.ok_or_else(missing_user)
    }

    pub fn clients(&self, user_id: &str) -> Result<Vec<Client>> {
        let db = self.db()?;
        require_user(&db, user_id)?;
        Ok(db.list_clients(user_id)?)
    }
}
