//! Asset service
//!
//! The operations a transport layer exposes, composed from the writer, the
//! derivation cache, the token codec and (optionally) the legacy link store.
//! File operations are blocking; only the legacy link operations are async.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::cache::{CacheStats, DerivationCache};
use crate::core::config::ServerConfig;
use crate::core::error::{ConfigError, Result, VaultError};
use crate::crypto::envelope;
use crate::imaging::Thumbnailer;
use crate::linkstore::{open_link_store, LinkIssuer, LinkStore, Sweeper};
use crate::storage::{AssetStore, DerivativeKey, NamingPolicy};
use crate::token::{GrantKind, TokenCodec};
use crate::writer::ContentWriter;

/// A freshly issued capability token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedLink {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Thumbnail tokens for every name that could be served
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchLinks {
    /// Logical name to token
    pub tokens: BTreeMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Content behind a redeemed link
#[derive(Debug, Clone)]
pub struct Redeemed {
    pub bytes: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A numeric link from the legacy store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegacyLink {
    pub token: i64,
    pub expires_at: DateTime<Utc>,
}

pub struct AssetService {
    store: AssetStore,
    writer: ContentWriter,
    cache: DerivationCache,
    codec: TokenCodec,
    default_ttl: Duration,
    /// Outstanding single-use upload tokens and their expiry
    upload_grants: DashMap<String, Option<DateTime<Utc>>>,
    legacy: Option<LinkIssuer>,
    sweeper: Option<JoinHandle<()>>,
}

impl AssetService {
    /// Build the file-backed service; legacy links stay off
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        config.ensure_storage_root()?;

        let store = AssetStore::new(
            config.storage_root.clone(),
            NamingPolicy::from_flag(config.hash_filenames),
        );

        Ok(Self {
            writer: ContentWriter::new(store.clone()),
            cache: DerivationCache::new(store.clone(), Thumbnailer::new(config.thumbnail_quality)),
            codec: TokenCodec::new(&config.encryption_secret),
            default_ttl: config.default_link_ttl(),
            upload_grants: DashMap::new(),
            legacy: None,
            sweeper: None,
            store,
        })
    }

    /// Build the service and, when configured, the legacy link store with its sweeper
    pub async fn start(config: &ServerConfig) -> Result<Self> {
        let mut service = Self::new(config)?;

        if let Some(link_store) = open_link_store(&config.legacy_links).await? {
            if let Some(interval) = config.legacy_links.sweep_interval() {
                service.sweeper = Sweeper::spawn(link_store.clone(), interval);
            }
            service.legacy = Some(LinkIssuer::new(link_store));
        }
        Ok(service)
    }

    /// Attach a legacy link store without starting a sweeper
    pub fn with_link_store(mut self, link_store: Arc<dyn LinkStore>) -> Self {
        self.legacy = Some(LinkIssuer::new(link_store));
        self
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Store an uploaded asset, returning its canonical identity
    pub fn upload(&self, name: &str, bytes: Vec<u8>, secret: Option<&str>) -> Result<String> {
        self.writer.write_asset(name, bytes, secret)
    }

    /// Read an asset back, opening it with `secret` if it is sealed
    pub fn download(&self, name: &str, secret: Option<&str>) -> Result<Vec<u8>> {
        let identity = self.store.asset_identity(name)?;
        envelope::open(secret, self.store.read(&identity)?)
    }

    /// Issue a token for an existing asset
    ///
    /// The asset must exist and `secret` must open it.
    pub fn create_link(
        &self,
        name: &str,
        ttl: Option<Duration>,
        secret: Option<&str>,
    ) -> Result<IssuedLink> {
        let identity = self.store.asset_identity(name)?;
        envelope::open(secret, self.store.read(&identity)?)?;

        let expires_at = self.expiry(ttl)?;
        let token = self
            .codec
            .create_token(&identity, Some(expires_at), effective(secret), None)?;
        Ok(IssuedLink { token, expires_at })
    }

    /// Materialize a thumbnail and issue a token for it
    pub fn create_thumbnail_link(
        &self,
        name: &str,
        resolution: u32,
        cropped: bool,
        ttl: Option<Duration>,
        secret: Option<&str>,
    ) -> Result<IssuedLink> {
        let expires_at = self.expiry(ttl)?;
        let token = self.thumbnail_token(name, resolution, cropped, expires_at, secret)?;
        Ok(IssuedLink { token, expires_at })
    }

    /// Thumbnail tokens for many assets at once
    ///
    /// Names that cannot be served are left out of the result.
    pub fn create_thumbnail_links(
        &self,
        names: &[String],
        resolution: u32,
        cropped: bool,
        ttl: Option<Duration>,
        secret: Option<&str>,
    ) -> Result<BatchLinks> {
        let expires_at = self.expiry(ttl)?;
        let mut batch = BatchLinks {
            tokens: BTreeMap::new(),
            expires_at: Some(expires_at),
        };

        for name in names {
            match self.thumbnail_token(name, resolution, cropped, expires_at, secret) {
                Ok(token) => {
                    batch.tokens.insert(name.clone(), token);
                }
                Err(e) => tracing::warn!(name = %name, resolution, "Skipping thumbnail: {}", e),
            }
        }
        Ok(batch)
    }

    /// Fetch the content a token grants
    ///
    /// A secret carried in the token wins; otherwise `fallback_secret` from
    /// the caller is used. Upload grants are not accepted here.
    pub fn redeem_link(&self, token: &str, fallback_secret: Option<&str>) -> Result<Redeemed> {
        let record = self.codec.parse_token(token)?;
        if record.kind != GrantKind::Read {
            tracing::debug!(name = %record.target, "Upload token presented for a read");
            return Err(VaultError::InvalidToken);
        }
        let secret = record.secret.as_deref().or(fallback_secret);

        let bytes = envelope::open(secret, self.store.read(&record.target)?)?;
        Ok(Redeemed {
            bytes,
            expires_at: record.expires_at,
        })
    }

    /// Issue a single-use token permitting one upload to `name`
    pub fn create_upload_link(
        &self,
        name: &str,
        ttl: Option<Duration>,
        secret: Option<&str>,
        resolutions: Option<&[u32]>,
    ) -> Result<IssuedLink> {
        // Fail now rather than when the upload arrives
        self.store.asset_identity(name)?;

        let expires_at = self.expiry(ttl)?;
        let token = self
            .codec
            .create_upload_token(name, Some(expires_at), effective(secret), resolutions)?;

        self.prune_upload_grants();
        self.upload_grants.insert(token.clone(), Some(expires_at));
        Ok(IssuedLink { token, expires_at })
    }

    /// Perform the upload an upload token grants, consuming the token
    ///
    /// Thumbnails listed in the token are rendered right away in fit mode.
    /// A failed pre-generation is logged and does not fail the upload.
    pub fn redeem_upload_link(&self, token: &str, bytes: Vec<u8>) -> Result<String> {
        let record = match self.codec.parse_token(token) {
            Ok(record) => record,
            Err(e) => {
                if matches!(e, VaultError::TokenExpired) {
                    self.upload_grants.remove(token);
                }
                return Err(e);
            }
        };

        if record.kind != GrantKind::Upload {
            return Err(VaultError::InvalidToken);
        }

        let Some((_, expires_at)) = self.upload_grants.remove(token) else {
            tracing::debug!("Upload token already used or unknown");
            return Err(VaultError::InvalidToken);
        };

        let secret = record.secret.as_deref();
        let identity = match self.writer.write_asset(&record.target, bytes, secret) {
            Ok(identity) => identity,
            Err(e) => {
                // Give the grant back so the holder can retry with valid content
                self.upload_grants.insert(token.to_string(), expires_at);
                return Err(e);
            }
        };

        for &resolution in record.resolutions.iter().flatten() {
            if let Err(e) = self
                .cache
                .check_or_create(&record.target, resolution, false, secret)
            {
                tracing::warn!(
                    name = %record.target,
                    resolution,
                    "Thumbnail pre-generation failed: {}",
                    e
                );
            }
        }
        Ok(identity)
    }

    /// Number of upload tokens issued but not yet used
    pub fn pending_uploads(&self) -> usize {
        self.upload_grants.len()
    }

    /// Issue a numeric link in the legacy store
    pub async fn create_legacy_link(
        &self,
        name: &str,
        ttl: Option<Duration>,
        secret: Option<&str>,
    ) -> Result<LegacyLink> {
        let issuer = self.legacy()?;
        let identity = self.store.asset_identity(name)?;
        envelope::open(secret, self.store.read(&identity)?)?;

        let expires_at = self.expiry(ttl)?;
        let token = issuer.issue(&identity, expires_at).await?;
        Ok(LegacyLink { token, expires_at })
    }

    /// Fetch the content behind a numeric link
    pub async fn redeem_legacy_link(&self, token: i64, secret: Option<&str>) -> Result<Redeemed> {
        let link = self.legacy()?.resolve(token).await?;
        let bytes = envelope::open(secret, self.store.read(&link.path)?)?;
        Ok(Redeemed {
            bytes,
            expires_at: Some(link.expires_at),
        })
    }

    fn legacy(&self) -> Result<&LinkIssuer> {
        self.legacy.as_ref().ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "legacy_links.enabled".to_string(),
                value: "false".to_string(),
            }
            .into()
        })
    }

    fn thumbnail_token(
        &self,
        name: &str,
        resolution: u32,
        cropped: bool,
        expires_at: DateTime<Utc>,
        secret: Option<&str>,
    ) -> Result<String> {
        self.cache.check_or_create(name, resolution, cropped, secret)?;

        let key = DerivativeKey::new(name, resolution, cropped)?;
        let identity = self.store.derivative_identity(&key)?;
        self.codec
            .create_token(&identity, Some(expires_at), effective(secret), None)
    }

    fn expiry(&self, ttl: Option<Duration>) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl.unwrap_or(self.default_ttl))
            .map_err(|e| VaultError::Internal(format!("link lifetime out of range: {}", e)))?;
        Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| VaultError::Internal("link lifetime out of range".to_string()))
    }

    fn prune_upload_grants(&self) {
        let now = Utc::now();
        self.upload_grants
            .retain(|_, expires_at| expires_at.map(|exp| now <= exp).unwrap_or(true));
    }
}

impl Drop for AssetService {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn effective(secret: Option<&str>) -> Option<&str> {
    envelope::effective_secret(secret)
}
