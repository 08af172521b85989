//! Derivation cache
//!
//! Thumbnails are synthesized lazily on first request and kept as ordinary
//! files next to their sources. A derivative lives until its source is
//! overwritten; there is no time-based eviction.
//!
//! Per key the lifecycle is Absent -> Creating -> Present, or
//! Absent -> CreationFailed (nothing persisted). Concurrent requests for the
//! same key may both synthesize; rendering is deterministic so whichever
//! write lands last is indistinguishable from the other.

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::core::error::Result;
use crate::crypto::envelope;
use crate::imaging::{ScaleMode, Thumbnailer};
use crate::storage::{AssetStore, DerivativeKey};

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests answered from an existing derivative
    pub hits: u64,
    /// Requests that found no derivative
    pub misses: u64,
    /// Derivatives rendered and persisted
    pub syntheses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    syntheses: AtomicU64,
}

/// Lazily materialized thumbnails backed by the asset store
#[derive(Debug)]
pub struct DerivationCache {
    store: AssetStore,
    thumbnailer: Thumbnailer,
    counters: Counters,
}

impl DerivationCache {
    pub fn new(store: AssetStore, thumbnailer: Thumbnailer) -> Self {
        Self {
            store,
            thumbnailer,
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Return the derivative of `source`, rendering it first if needed
    ///
    /// `source` is the caller's logical name. A sealed source is opened with
    /// `secret` and its derivative is sealed with the same secret; the
    /// derivative of an unsealed source is stored unsealed whatever secret
    /// the caller sent. An existing
    /// derivative that the secret cannot open is reported as
    /// `BadEncryptionSecret` and left in place.
    pub fn check_or_create(
        &self,
        source: &str,
        resolution: u32,
        cropped: bool,
        secret: Option<&str>,
    ) -> Result<Vec<u8>> {
        let key = DerivativeKey::new(source, resolution, cropped)?;
        let identity = self.store.derivative_identity(&key)?;

        match self.store.read(&identity) {
            Ok(stored) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return envelope::open(secret, stored);
            }
            Err(e) if e.is_not_found() => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }

        self.synthesize(&key, &identity, secret)?;

        let persisted = self.store.read(&identity)?;
        envelope::open(secret, persisted)
    }

    fn synthesize(&self, key: &DerivativeKey, identity: &str, secret: Option<&str>) -> Result<()> {
        let source_identity = self.store.asset_identity(&key.source)?;
        let stored = self.store.read(&source_identity)?;
        let seal_with = if envelope::is_sealed(&stored) { secret } else { None };
        let source_bytes = envelope::open(secret, stored)?;

        let rendered = self.thumbnailer.render(
            &source_bytes,
            key.resolution,
            ScaleMode::from_cropped(key.cropped),
        )?;

        // The source must know about a derivative before it exists on disk
        self.store
            .dependencies(&source_identity)
            .register(identity)?;

        let sealed = envelope::seal(seal_with, rendered)?;
        self.store.write(identity, &sealed)?;
        self.counters.syntheses.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            source = %key.source,
            resolution = key.resolution,
            cropped = key.cropped,
            bytes = sealed.len(),
            "Synthesized derivative"
        );
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            syntheses: self.counters.syntheses.load(Ordering::Relaxed),
        }
    }
}
