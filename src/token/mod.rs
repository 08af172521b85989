//! Capability Tokens
//!
//! Self-contained, encrypted bearer strings granting time-limited access to
//! one asset without any server-side session state. Tokens cannot be revoked
//! early; issuers bound the damage with a default expiry.

mod codec;

pub use codec::{CapabilityRecord, GrantKind, TokenCodec};
