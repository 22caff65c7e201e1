use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use usage_core::{Client, User};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_ts, row_to_client, row_to_user};

impl Db {
    pub fn create_user(&self, id: &str, username: &str) -> Result<User> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO users (id, username, billing_day, created_at) VALUES (?1, ?2, 0, ?3)",
            params![id, username, format_ts(created_at)],
        )?;
        Ok(User {
            id: id.to_string(),
            username: username.to_string(),
            billing_day: 0,
            created_at,
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, billing_day, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, billing_day, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Stores the billing anchor. Returns false when the user does not exist.
    ///
    /// Cycle summaries are not touched here; callers follow up with
    /// [`Db::rebuild_cycle_summaries`].
    pub fn update_billing_anchor(&self, user_id: &str, billing_day: u32) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET billing_day = ?1 WHERE id = ?2",
            params![billing_day as i64, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_or_create_client(
        &self,
        user_id: &str,
        client_id: &str,
        name: &str,
    ) -> Result<Client> {
        if let Some(client) = self.get_client(user_id, client_id)? {
            return Ok(client);
        }
        let created_at = format_ts(Utc::now());
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO clients (id, user_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![client_id, user_id, name, created_at],
        )?;
        self.get_client(user_id, client_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_client(&self, user_id: &str, client_id: &str) -> Result<Option<Client>> {
        self.conn
            .query_row(
                r#"
                SELECT id, user_id, name, last_sync_at, created_at
                FROM clients
                WHERE user_id = ?1 AND id = ?2
                "#,
                params![user_id, client_id],
                row_to_client,
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn list_clients(&self, user_id: &str) -> Result<Vec<Client>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, name, last_sync_at, created_at
            FROM clients
            WHERE user_id = ?1
            ORDER BY created_at ASC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![user_id], row_to_client)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_client_last_sync(
        &self,
        user_id: &str,
        client_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE clients SET last_sync_at = ?1 WHERE user_id = ?2 AND id = ?3",
            params![format_ts(synced_at), user_id, client_id],
        )?;
        Ok(())
    }

    /// Last successful sync of a client, `None` if it never synced or is unknown.
    pub fn client_sync_status(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_client(user_id, client_id)?
            .and_then(|client| client.last_sync_at))
    }
}
