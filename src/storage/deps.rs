//! Dependency sidecars
//!
//! Each source asset may have a `<asset path>_deps` file listing, one per
//! line, the root-relative identity of every derivative synthesized from it.
//! Entries are appended before the derivative itself is written, so a
//! derivative on disk is always reachable from its source's record. Duplicate
//! lines are harmless.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{Result, VaultError};

/// Suffix appended to an asset path to name its sidecar
pub const DEPS_SUFFIX: &str = "_deps";

/// Append-only list of derivatives generated from one source asset
#[derive(Debug, Clone)]
pub struct DependencyRecord {
    root: PathBuf,
    identity: String,
}

impl DependencyRecord {
    /// Sidecar of the asset stored as `identity` under `root`
    pub fn new(root: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self) -> PathBuf {
        sidecar_path(&self.root, &self.identity)
    }

    /// Record that the derivative stored as `derivative` was generated from this asset
    ///
    /// Each line goes out in a single append so concurrent registrations
    /// never interleave within a line.
    pub fn register(&self, derivative: &str) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = derivative.to_string();
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        tracing::trace!(record = %path.display(), derivative, "Registered derivative");
        Ok(())
    }

    /// Distinct derivative identities in registration order; empty when no record exists
    pub fn entries(&self) -> Result<Vec<String>> {
        read_entries(&self.path())
    }

    /// Delete every listed derivative, then the record itself
    ///
    /// A derivative that was itself used as a source has its own record
    /// purged the same way. Entries already gone are skipped. Returns how
    /// many derivative files were removed.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        let mut visited = HashSet::new();
        let mut pending = vec![self.identity.clone()];

        while let Some(identity) = pending.pop() {
            if !visited.insert(identity.clone()) {
                continue;
            }
            let record = sidecar_path(&self.root, &identity);
            for derivative in read_entries(&record)? {
                if remove_if_present(&self.root.join(&derivative))? {
                    removed += 1;
                }
                pending.push(derivative);
            }
            remove_if_present(&record)?;
        }

        if removed > 0 {
            tracing::debug!(asset = %self.identity, removed, "Invalidated derivatives");
        }
        Ok(removed)
    }
}

fn sidecar_path(root: &Path, identity: &str) -> PathBuf {
    let mut raw: OsString = root.join(identity).into_os_string();
    raw.push(DEPS_SUFFIX);
    PathBuf::from(raw)
}

fn read_entries(path: &Path) -> Result<Vec<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(VaultError::StorageIo(e)),
    };

    let mut entries: Vec<String> = Vec::new();
    for line in content.lines().filter(|l| !l.is_empty()) {
        if !entries.iter().any(|e| e == line) {
            entries.push(line.to_string());
        }
    }
    Ok(entries)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(VaultError::StorageIo(e)),
    }
}
