//! SQLite-backed user store.
//!
//! City lists are stored as a JSON array in a TEXT column.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use crate::{
    error::{Error, Result},
    model::User,
};

use super::UserStore;

pub struct SqliteUserStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStore {
    /// Opens (or creates) the database file and its schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email TEXT NOT NULL PRIMARY KEY,
                cities TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn encode_cities(cities: &[String]) -> Result<String> {
        serde_json::to_string(cities).map_err(|e| Error::data("user cities", e))
    }

    fn decode_cities(raw: &str) -> Result<Vec<String>> {
        serde_json::from_str(raw).map_err(|e| Error::data("user cities", e))
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT email, cities FROM users ORDER BY email")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut users = Vec::with_capacity(rows.len());
        for (email, raw) in rows {
            match Self::decode_cities(&raw) {
                Ok(cities) => users.push(User { email, cities }),
                Err(e) => tracing::warn!(%email, error = %e, "skipping user with unreadable cities"),
            }
        }
        Ok(users)
    }

    async fn user_exists(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<String> = conn
            .query_row("SELECT email FROM users WHERE email = ?1", params![email], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    async fn get_user(&self, email: &str) -> Result<Option<User>> {
        let raw: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row("SELECT cities FROM users WHERE email = ?1", params![email], |row| {
                row.get(0)
            })
            .optional()?
        };

        raw.map(|raw| {
            Ok(User {
                email: email.to_string(),
                cities: Self::decode_cities(&raw)?,
            })
        })
        .transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let cities = Self::encode_cities(&user.cities)?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (email, cities) VALUES (?1, ?2)",
            params![user.email, cities],
        )?;
        if inserted == 0 {
            return Err(Error::Conflict(format!("user {}", user.email)));
        }
        Ok(())
    }

    async fn update_cities(&self, email: &str, cities: &[String]) -> Result<()> {
        let cities = Self::encode_cities(cities)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE users SET cities = ?1 WHERE email = ?2",
            params![cities, email],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("user {email}")));
        }
        Ok(())
    }

    async fn delete_user(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM users WHERE email = ?1", params![email])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, cities: &[&str]) -> User {
        User {
            email: email.to_string(),
            cities: cities.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn insert_then_read_back() {
        let store = SqliteUserStore::in_memory().unwrap();
        store.insert_user(&user("a@example.com", &["Oslo", "Rome"])).await.unwrap();

        assert!(store.user_exists("a@example.com").await.unwrap());
        assert!(!store.user_exists("b@example.com").await.unwrap());
        assert_eq!(
            store.get_user("a@example.com").await.unwrap(),
            Some(user("a@example.com", &["Oslo", "Rome"]))
        );
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = SqliteUserStore::in_memory().unwrap();
        store.insert_user(&user("a@example.com", &[])).await.unwrap();
        let err = store.insert_user(&user("a@example.com", &["Oslo"])).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.get_user("a@example.com").await.unwrap().unwrap().cities, Vec::<String>::new());
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let store = SqliteUserStore::in_memory().unwrap();
        let err = store
            .update_cities("ghost@example.com", &["Oslo".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_update_and_delete() {
        let store = SqliteUserStore::in_memory().unwrap();
        store.insert_user(&user("b@example.com", &["Berlin"])).await.unwrap();
        store.insert_user(&user("a@example.com", &["Oslo"])).await.unwrap();
        store
            .update_cities("a@example.com", &["Tokyo".to_string(), "Oslo".to_string()])
            .await
            .unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(
            users,
            vec![user("a@example.com", &["Tokyo", "Oslo"]), user("b@example.com", &["Berlin"])]
        );

        assert!(store.delete_user("b@example.com").await.unwrap());
        assert!(!store.delete_user("b@example.com").await.unwrap());
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }
}
