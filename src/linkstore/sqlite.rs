//! Durable link store on SQLite
//!
//! Every mutation is written to the `links` table before it is acknowledged.
//! Reads go through an in-memory cache filled on first lookup. A single async
//! mutex serializes cache access with the database statements that go with
//! it, including the expiry sweep.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::{Link, LinkStore};
use crate::core::error::{Result, VaultError};

const CREATE_LINKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS links (
        token INTEGER PRIMARY KEY,
        path TEXT NOT NULL,
        expires_at TIMESTAMP NOT NULL
    )
"#;

pub struct SqliteLinkStore {
    pool: SqlitePool,
    cache: Mutex<HashMap<i64, Link>>,
}

impl SqliteLinkStore {
    /// Open (creating if needed) the database file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await?;

        tracing::info!("Legacy link store opened: {:?}", db_path);
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        // One connection, or every checkout would see a fresh empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the `links` table if missing
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_LINKS_TABLE).execute(&pool).await?;
        Ok(Self {
            pool,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, token: i64) -> Result<Option<Link>> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT path, expires_at FROM links WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(path, expires_at)| Link { path, expires_at }))
    }

    async fn remove_row(&self, token: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM links WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn add_link(&self, token: i64, link: Link) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if cache.contains_key(&token) {
            return Err(VaultError::TokenAlreadyExists);
        }

        let inserted = sqlx::query("INSERT INTO links (token, path, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(&link.path)
            .bind(link.expires_at)
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(_) => {
                cache.insert(token, link);
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(VaultError::TokenAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_link(&self, token: i64) -> Result<Link> {
        let mut cache = self.cache.lock().await;

        let link = match cache.get(&token) {
            Some(link) => link.clone(),
            None => {
                let link = self
                    .fetch(token)
                    .await?
                    .ok_or_else(|| VaultError::not_found(format!("link {}", token)))?;
                cache.insert(token, link.clone());
                link
            }
        };

        if link.is_expired_at(Utc::now()) {
            cache.remove(&token);
            self.remove_row(token).await?;
            return Err(VaultError::TokenExpired);
        }
        Ok(link)
    }

    async fn delete_link(&self, token: i64) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let cached = cache.remove(&token).is_some();
        let removed = self.remove_row(token).await?;

        if removed == 0 && !cached {
            return Err(VaultError::not_found(format!("link {}", token)));
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = Utc::now();
        let mut cache = self.cache.lock().await;
        cache.retain(|_, link| !link.is_expired_at(now));

        let result = sqlx::query("DELETE FROM links WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
