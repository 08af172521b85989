//! Logical name to on-disk identity mapping
//!
//! Identities are `/`-separated paths relative to the storage root. With
//! hashing enabled a name becomes `h[0]/h[1]/h` where `h` is the URL-safe
//! base64 SHA-384 of the name, spreading files over two directory levels.
//! Hashed derivative names are taken over a NUL-separated key, which no
//! uploaded name can reproduce and no two distinct keys share.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha384};

use super::deps::DEPS_SUFFIX;
use crate::core::error::{Result, VaultError};

/// Server-wide file naming policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// Use the caller's name as the relative path
    #[default]
    Verbatim,
    /// Use a fan-out content hash of the name
    Hashed,
}

/// Parameters identifying one derivative of a source asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    /// Logical name of the source asset, as the caller supplied it
    pub source: String,
    /// Target size of the longer side (fit) or of both sides (crop)
    pub resolution: u32,
    /// Square center-crop instead of aspect-preserving fit
    pub cropped: bool,
}

impl DerivativeKey {
    pub fn new(source: impl Into<String>, resolution: u32, cropped: bool) -> Result<Self> {
        if resolution == 0 {
            return Err(VaultError::InvalidResolution { resolution });
        }
        Ok(Self {
            source: source.into(),
            resolution,
            cropped,
        })
    }
}

/// URL-safe base64 of SHA-384; 48 bytes encode to exactly 64 characters
pub fn calculate_hash(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha384::digest(name.as_bytes()))
}

impl NamingPolicy {
    pub fn from_flag(hash_filenames: bool) -> Self {
        if hash_filenames {
            NamingPolicy::Hashed
        } else {
            NamingPolicy::Verbatim
        }
    }

    /// Canonical identity of an uploaded asset
    pub fn asset_identity(&self, raw: &str) -> Result<String> {
        match self {
            NamingPolicy::Verbatim => normalize(raw),
            NamingPolicy::Hashed => {
                if raw.is_empty() || raw.contains('\0') {
                    return Err(VaultError::InvalidName {
                        name: raw.to_string(),
                    });
                }
                Ok(fan_out(&calculate_hash(raw)))
            }
        }
    }

    /// Canonical identity of a derivative
    pub fn derivative_identity(&self, key: &DerivativeKey) -> Result<String> {
        match self {
            NamingPolicy::Verbatim => {
                let mut name = format!("{}_{}", key.source, key.resolution);
                if key.cropped {
                    name.push_str("_crop");
                }
                normalize(&name)
            }
            NamingPolicy::Hashed => {
                let mut input = format!("{}\0{}", key.source, key.resolution);
                if key.cropped {
                    input.push_str("\0crop");
                }
                Ok(fan_out(&calculate_hash(&input)))
            }
        }
    }
}

fn fan_out(hash: &str) -> String {
    format!("{}/{}/{}", &hash[0..1], &hash[1..2], hash)
}

/// Strip a leading `/` and refuse anything that could escape the root or
/// shadow a dependency sidecar
fn normalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim_start_matches('/');
    let invalid = || VaultError::InvalidName {
        name: raw.to_string(),
    };

    if trimmed.is_empty()
        || trimmed.ends_with(DEPS_SUFFIX)
        || trimmed.contains(['\\', '\0'])
    {
        return Err(invalid());
    }
    if trimmed
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(invalid());
    }
    Ok(trimmed.to_string())
}
