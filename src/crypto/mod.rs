//! Symmetric encryption
//!
//! - `cipher`: AES-256-GCM keyed from a hashed secret, nonce prepended
//! - `envelope`: marked encrypted-at-rest format for stored assets

pub mod cipher;
pub mod envelope;

pub use cipher::{decrypt, encrypt, SymmetricCipher, NONCE_LEN, TAG_LEN};
pub use envelope::{effective_secret, is_sealed, open, seal, ENVELOPE_MAGIC};
