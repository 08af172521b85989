//! Numeric link allocation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

use super::{Link, LinkStore};
use crate::core::error::{Result, VaultError};

/// Attempts at drawing an unused token before giving up
pub const MAX_LINK_ATTEMPTS: usize = 10;

type TokenSource = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Allocates random positive tokens in a link store
#[derive(Clone)]
pub struct LinkIssuer {
    store: Arc<dyn LinkStore>,
    next_token: TokenSource,
}

impl LinkIssuer {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self {
            store,
            next_token: Arc::new(|| rand::thread_rng().gen_range(1..=i64::MAX)),
        }
    }

    /// Replace the random token source
    pub fn with_token_source(mut self, source: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.next_token = Arc::new(source);
        self
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    /// Register a link to `path`, retrying on token collisions
    pub async fn issue(&self, path: &str, expires_at: DateTime<Utc>) -> Result<i64> {
        for attempt in 1..=MAX_LINK_ATTEMPTS {
            let token = (self.next_token)();
            match self.store.add_link(token, Link::new(path, expires_at)).await {
                Ok(()) => return Ok(token),
                Err(VaultError::TokenAlreadyExists) => {
                    tracing::debug!(attempt, "Link token collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(path, "Gave up allocating a link token");
        Err(VaultError::TooManyAttempts)
    }

    /// Look up the target of a numeric link
    pub async fn resolve(&self, token: i64) -> Result<Link> {
        self.store.get_link(token).await
    }
}
