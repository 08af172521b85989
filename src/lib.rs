//! ImageVault - image asset service core
//!
//! This crate provides the storage and access layer of an image server:
//! - Stateless, encrypted capability tokens for time-limited access
//! - Optional per-asset encryption at rest
//! - Lazily rendered, cached thumbnails with dependency-tracked invalidation
//! - A legacy numeric link store kept for older clients
//!
//! HTTP routing, authentication and request parsing belong to the embedding
//! server; `service::AssetService` is the surface it calls into.

pub mod cache;
pub mod core;
pub mod crypto;
pub mod imaging;
pub mod linkstore;
pub mod logging;
pub mod service;
pub mod storage;
pub mod token;
pub mod writer;

// Re-export commonly used items
pub use cache::{CacheStats, DerivationCache};
pub use crate::core::config::{LegacyLinkConfig, ServerConfig};
pub use crate::core::error::{Result, VaultError};
pub use imaging::{ScaleMode, SourceFormat, Thumbnailer};
pub use linkstore::{Link, LinkIssuer, LinkStore, MemoryLinkStore, SqliteLinkStore, Sweeper};
pub use logging::{LoggingConfig, LoggingSystem};
pub use service::{AssetService, BatchLinks, IssuedLink, LegacyLink, Redeemed};
pub use storage::{AssetStore, DependencyRecord, DerivativeKey, NamingPolicy};
pub use token::{CapabilityRecord, GrantKind, TokenCodec};
pub use writer::ContentWriter;
