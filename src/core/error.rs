//! Error types for ImageVault
//!
//! One crate-level error with typed kinds the transport layer can map onto
//! responses without inspecting message strings.

use thiserror::Error;

/// Result type alias for ImageVault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for ImageVault
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Bad encryption secret")]
    BadEncryptionSecret,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token already exists")]
    TokenAlreadyExists,

    #[error("Too many attempts tried")]
    TooManyAttempts,

    #[error("Content type {detected} not supported")]
    InvalidContentType { detected: String },

    #[error("Unsupported source image: {reason}")]
    UnsupportedSource { reason: String },

    #[error("Invalid asset name: '{name}'")]
    InvalidName { name: String },

    #[error("Invalid resolution: {resolution}")]
    InvalidResolution { resolution: u32 },

    #[error("Image processing failed: {reason}")]
    Imaging { reason: String },

    #[error("Storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("Link store error: {0}")]
    LinkStore(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Symmetric cipher errors
///
/// Every way an open can fail (wrong key, tampered tag, truncated input)
/// surfaces as the single `AuthenticationFailed` variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("Invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Build a `NotFound` for anything displayable (paths, names, token ids)
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        VaultError::NotFound {
            what: what.to_string(),
        }
    }

    /// Map a filesystem error on `path`, turning a missing file into `NotFound`
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            VaultError::not_found(path.display())
        } else {
            VaultError::StorageIo(err)
        }
    }

    /// Check if this error should result in a 404 Not Found response
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound { .. })
    }

    /// Check if this error is a credential or grant failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            VaultError::BadEncryptionSecret | VaultError::InvalidToken | VaultError::TokenExpired
        )
    }

    /// Check if the caller sent something we will never accept as-is
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidContentType { .. }
                | VaultError::UnsupportedSource { .. }
                | VaultError::InvalidName { .. }
                | VaultError::InvalidResolution { .. }
        ) || self.is_auth_failure()
            || self.is_not_found()
    }
}

impl From<image::ImageError> for VaultError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => VaultError::UnsupportedSource {
                reason: e.to_string(),
            },
            image::ImageError::IoError(e) => VaultError::StorageIo(e),
            other => VaultError::Imaging {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = VaultError::from_io(
            Path::new("/srv/images/cat.png"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("cat.png"));
    }

    #[test]
    fn test_other_io_errors_stay_storage_io() {
        let err = VaultError::from_io(
            Path::new("/srv/images/cat.png"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, VaultError::StorageIo(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_classification() {
        assert!(VaultError::TokenExpired.is_auth_failure());
        assert!(VaultError::InvalidToken.is_client_error());
        assert!(VaultError::InvalidContentType {
            detected: "text/plain".into()
        }
        .is_client_error());
        assert!(!VaultError::TooManyAttempts.is_client_error());
    }

    #[test]
    fn test_token_errors_do_not_leak_detail() {
        assert_eq!(VaultError::InvalidToken.to_string(), "Invalid token");
    }
}
