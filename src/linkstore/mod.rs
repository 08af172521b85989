//! Legacy numeric link store
//!
//! Before capability tokens, links were random integers mapped to a file path
//! and an expiry. The mapping is kept for clients that still hold such links:
//! - `memory`: process-local map
//! - `sqlite`: durable write-through store with an in-memory cache
//! - `issuer`: collision-retrying token allocation
//! - `sweeper`: periodic removal of expired links

pub mod issuer;
pub mod memory;
pub mod sqlite;
pub mod sweeper;


use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::config::LegacyLinkConfig;
use crate::core::error::Result;

pub use issuer::{LinkIssuer, MAX_LINK_ATTEMPTS};
pub use memory::MemoryLinkStore;
pub use sqlite::SqliteLinkStore;
pub use sweeper::Sweeper;

/// A numeric link's target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Canonical identity of the linked file
    pub path: String,
    pub expires_at: DateTime<Utc>,
}

impl Link {
    pub fn new(path: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Storage for numeric links
///
/// Implementations must treat a duplicate `add_link` as `TokenAlreadyExists`
/// (first writer wins), return `NotFound` for unknown tokens and remove an
/// expired link when it is looked up, reporting `TokenExpired`.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn add_link(&self, token: i64, link: Link) -> Result<()>;

    async fn get_link(&self, token: i64) -> Result<Link>;

    async fn delete_link(&self, token: i64) -> Result<()>;

    /// Drop every link expired at the time of the call, returning how many went
    async fn cleanup(&self) -> Result<usize>;
}

/// Build the configured store, or `None` when legacy links are disabled
pub async fn open_link_store(config: &LegacyLinkConfig) -> Result<Option<Arc<dyn LinkStore>>> {
    if !config.enabled {
        return Ok(None);
    }

    let store: Arc<dyn LinkStore> = match &config.database_path {
        Some(path) => Arc::new(SqliteLinkStore::open(path).await?),
        None => Arc::new(MemoryLinkStore::new()),
    };
    Ok(Some(store))
}
