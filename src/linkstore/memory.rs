//! In-process link store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{Link, LinkStore};
use crate::core::error::{Result, VaultError};

/// Links held in a mutex-guarded map; lost on restart
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    links: Mutex<HashMap<i64, Link>>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn add_link(&self, token: i64, link: Link) -> Result<()> {
        let mut links = self.links.lock();
        if links.contains_key(&token) {
            return Err(VaultError::TokenAlreadyExists);
        }
        links.insert(token, link);
        Ok(())
    }

    async fn get_link(&self, token: i64) -> Result<Link> {
        let mut links = self.links.lock();
        let link = links
            .get(&token)
            .cloned()
            .ok_or_else(|| VaultError::not_found(format!("link {}", token)))?;

        if link.is_expired_at(Utc::now()) {
            links.remove(&token);
            return Err(VaultError::TokenExpired);
        }
        Ok(link)
    }

    async fn delete_link(&self, token: i64) -> Result<()> {
        self.links
            .lock()
            .remove(&token)
            .map(|_| ())
            .ok_or_else(|| VaultError::not_found(format!("link {}", token)))
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = Utc::now();
        let mut links = self.links.lock();
        let before = links.len();
        links.retain(|_, link| !link.is_expired_at(now));
        Ok(before - links.len())
    }
}
