//! Content writer
//!
//! Persists uploaded assets. Overwriting an asset first removes every
//! derivative recorded against it so no stale thumbnail outlives its source.

use crate::core::error::Result;
use crate::crypto::envelope;
use crate::imaging::SourceFormat;
use crate::storage::AssetStore;

/// Writes source assets into the store
#[derive(Debug, Clone)]
pub struct ContentWriter {
    store: AssetStore,
}

impl ContentWriter {
    pub fn new(store: AssetStore) -> Self {
        Self { store }
    }

    /// Store `bytes` under `raw_name`, returning the canonical identity
    ///
    /// Only JPEG, PNG, GIF and BMP signatures are accepted. With a secret the
    /// asset is sealed before it touches the disk.
    pub fn write_asset(&self, raw_name: &str, bytes: Vec<u8>, secret: Option<&str>) -> Result<String> {
        let identity = self.store.asset_identity(raw_name)?;
        self.store.ensure_parent(&identity)?;

        let format = SourceFormat::require(&bytes)?;

        let invalidated = self.store.dependencies(&identity).purge()?;

        let sealed = envelope::seal(secret, bytes)?;
        self.store.write(&identity, &sealed)?;

        tracing::info!(
            name = %raw_name,
            format = format.mime_type(),
            encrypted = envelope::effective_secret(secret).is_some(),
            invalidated,
            "Stored asset"
        );
        Ok(identity)
    }
}
