//! Stateless capability tokens
//!
//! A token is `base64url-nopad(nonce || AES-GCM(record))` where the record is the
//! compact JSON object `{f, e?, s?, r?, k?}`. The server keeps nothing: validity
//! is whatever decrypts under the server-wide secret and has not yet expired.
//! `k` is present only on upload grants, which never authorize a read.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, VaultError};
use crate::crypto::SymmetricCipher;

/// What a token lets its holder do with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantKind {
    /// Fetch the stored content
    #[default]
    Read,
    /// Write the target once
    Upload,
}

impl GrantKind {
    fn is_read(&self) -> bool {
        *self == GrantKind::Read
    }
}

/// Access grant carried inside a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRecord {
    /// Canonical identity of the asset the holder may fetch (or write, for upload grants)
    pub target: String,
    /// Instant after which the grant is void; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Per-asset secret needed to open the target
    pub secret: Option<String>,
    /// Thumbnail resolutions to pre-generate once the target is written
    pub resolutions: Option<Vec<u32>>,
    pub kind: GrantKind,
}

impl CapabilityRecord {
    /// Read grant on `target` with no expiry, secret or resolutions
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            expires_at: None,
            secret: None,
            resolutions: None,
            kind: GrantKind::Read,
        }
    }

    pub fn with_kind(mut self, kind: GrantKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_resolutions(mut self, resolutions: Vec<u32>) -> Self {
        self.resolutions = Some(resolutions);
        self
    }

    /// Whether the grant has lapsed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// On-the-wire shape; absent fields are omitted entirely
#[derive(Serialize, Deserialize)]
struct WireRecord {
    #[serde(rename = "f")]
    target: String,
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    resolutions: Option<Vec<u32>>,
    #[serde(rename = "k", default, skip_serializing_if = "GrantKind::is_read")]
    kind: GrantKind,
}

/// Encodes and decodes capability tokens under the server-wide secret
#[derive(Clone)]
pub struct TokenCodec {
    cipher: SymmetricCipher,
}

impl TokenCodec {
    /// Create a codec bound to the server-wide secret
    pub fn new(server_secret: &SecretString) -> Self {
        Self {
            cipher: SymmetricCipher::new(server_secret.expose_secret()),
        }
    }

    /// Build a read token from its individual fields
    pub fn create_token(
        &self,
        target: &str,
        expires_at: Option<DateTime<Utc>>,
        secret: Option<&str>,
        resolutions: Option<&[u32]>,
    ) -> Result<String> {
        self.encode(&build_record(target, expires_at, secret, resolutions, GrantKind::Read))
    }

    /// Build a token that only permits writing `target`
    pub fn create_upload_token(
        &self,
        target: &str,
        expires_at: Option<DateTime<Utc>>,
        secret: Option<&str>,
        resolutions: Option<&[u32]>,
    ) -> Result<String> {
        self.encode(&build_record(target, expires_at, secret, resolutions, GrantKind::Upload))
    }

    /// Seal a record into an opaque URL-safe string
    ///
    /// Expiry is carried in whole seconds; sub-second precision is dropped.
    pub fn encode(&self, record: &CapabilityRecord) -> Result<String> {
        if let Some(&bad) = record
            .resolutions
            .iter()
            .flatten()
            .find(|&&r| r == 0)
        {
            return Err(VaultError::InvalidResolution { resolution: bad });
        }

        let wire = WireRecord {
            target: record.target.clone(),
            expires_at: record.expires_at.map(|t| t.timestamp()),
            secret: record.secret.clone(),
            resolutions: record.resolutions.clone(),
            kind: record.kind,
        };
        let json = serde_json::to_vec(&wire)
            .map_err(|e| VaultError::Internal(format!("token serialization: {}", e)))?;

        let sealed = self.cipher.encrypt(&json)?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode and validate a token against the current time
    pub fn parse_token(&self, token: &str) -> Result<CapabilityRecord> {
        self.parse_token_at(token, Utc::now())
    }

    /// Decode and validate a token against `now`
    ///
    /// Encoding errors, authentication failures and malformed records all
    /// collapse into `InvalidToken`; only a genuine, lapsed grant yields
    /// `TokenExpired`.
    pub fn parse_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<CapabilityRecord> {
        let record = self.decode(token).map_err(|reason| {
            tracing::debug!(reason, "Rejected capability token");
            VaultError::InvalidToken
        })?;

        if record.is_expired_at(now) {
            return Err(VaultError::TokenExpired);
        }
        Ok(record)
    }

    fn decode(&self, token: &str) -> std::result::Result<CapabilityRecord, &'static str> {
        let sealed = URL_SAFE_NO_PAD.decode(token).map_err(|_| "encoding")?;
        let json = self.cipher.decrypt(&sealed).map_err(|_| "authentication")?;
        let wire: WireRecord = serde_json::from_slice(&json).map_err(|_| "record")?;

        let expires_at = match wire.expires_at {
            Some(secs) => Some(Utc.timestamp_opt(secs, 0).single().ok_or("expiry")?),
            None => None,
        };

        Ok(CapabilityRecord {
            target: wire.target,
            expires_at,
            secret: wire.secret,
            resolutions: wire.resolutions,
            kind: wire.kind,
        })
    }
}

fn build_record(
    target: &str,
    expires_at: Option<DateTime<Utc>>,
    secret: Option<&str>,
    resolutions: Option<&[u32]>,
    kind: GrantKind,
) -> CapabilityRecord {
    CapabilityRecord {
        target: target.to_string(),
        expires_at,
        secret: secret.map(str::to_string),
        resolutions: resolutions.map(<[u32]>::to_vec),
        kind,
    }
}
