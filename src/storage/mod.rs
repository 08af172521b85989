//! Asset storage layout
//!
//! Everything lives as plain files under one storage root:
//! - `naming`: logical names to relative on-disk identities
//! - `deps`: per-asset sidecars listing generated derivatives
//!
//! `AssetStore` ties the two to a root directory. There is no locking on the
//! root; writes go through a temporary file and a rename so readers only ever
//! observe complete files.

pub mod deps;
pub mod naming;

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::core::error::{Result, VaultError};

pub use deps::{DependencyRecord, DEPS_SUFFIX};
pub use naming::{calculate_hash, DerivativeKey, NamingPolicy};

/// File-backed asset storage under a single root
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
    policy: NamingPolicy,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>, policy: NamingPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    /// Canonical identity for an uploaded asset name
    pub fn asset_identity(&self, raw: &str) -> Result<String> {
        self.policy.asset_identity(raw)
    }

    /// Canonical identity for a derivative
    pub fn derivative_identity(&self, key: &DerivativeKey) -> Result<String> {
        self.policy.derivative_identity(key)
    }

    /// Full path of an identity under the root
    pub fn path_of(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Dependency sidecar of the asset with this identity
    pub fn dependencies(&self, identity: &str) -> DependencyRecord {
        DependencyRecord::new(self.root.clone(), identity)
    }

    pub fn exists(&self, identity: &str) -> bool {
        self.path_of(identity).is_file()
    }

    /// Read stored bytes; a missing file is `NotFound`
    pub fn read(&self, identity: &str) -> Result<Vec<u8>> {
        let path = self.path_of(identity);
        fs::read(&path).map_err(|e| VaultError::from_io(&path, e))
    }

    /// Create the directories leading up to an identity
    pub fn ensure_parent(&self, identity: &str) -> Result<()> {
        if let Some(parent) = self.path_of(identity).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Replace the file at `identity` with `bytes` in one step
    pub fn write(&self, identity: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_parent(identity)?;

        let path = self.path_of(identity);
        let temp_path = temp_sibling(&path);
        if let Err(e) = fs::write(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(VaultError::StorageIo(e));
        }
        Ok(())
    }
}

/// Unique hidden sibling so concurrent writers never share a temp file
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce: u64 = rand::thread_rng().gen();
    path.with_file_name(format!(".{}.{:016x}.tmp", name, nonce))
}
