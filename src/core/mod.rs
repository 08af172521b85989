//! ImageVault Core Module
//!
//! This module contains the core functionality shared by every component:
//! - Configuration management
//! - Error types and handling

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{LegacyLinkConfig, ServerConfig};
pub use error::{CipherError, ConfigError, Result, VaultError};
