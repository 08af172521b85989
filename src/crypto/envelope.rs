//! Encrypted-at-rest envelope for stored assets
//!
//! Sealed files start with a 4-byte marker followed by the cipher output, so a
//! plaintext image and an encrypted one are told apart without metadata. Every
//! accepted upload format begins with its own signature, none of which collide
//! with the marker.

use super::cipher::SymmetricCipher;
use crate::core::error::{CipherError, Result, VaultError};

/// Marker prefixed to every encrypted asset
pub const ENVELOPE_MAGIC: &[u8; 4] = b"IVE1";

/// Treat an empty secret the same as no secret at all
pub fn effective_secret(secret: Option<&str>) -> Option<&str> {
    secret.filter(|s| !s.is_empty())
}

/// Whether stored bytes carry the encryption marker
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(ENVELOPE_MAGIC)
}

/// Encrypt `plaintext` when a secret is supplied, otherwise pass it through
pub fn seal(secret: Option<&str>, plaintext: Vec<u8>) -> Result<Vec<u8>> {
    let Some(secret) = effective_secret(secret) else {
        return Ok(plaintext);
    };

    let sealed = SymmetricCipher::new(secret).encrypt(&plaintext)?;
    let mut output = Vec::with_capacity(ENVELOPE_MAGIC.len() + sealed.len());
    output.extend_from_slice(ENVELOPE_MAGIC);
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Recover plaintext from stored bytes
///
/// Unsealed bytes are returned untouched whatever secret is given. Sealed bytes
/// need the secret they were written with; anything else is
/// `BadEncryptionSecret`.
pub fn open(secret: Option<&str>, stored: Vec<u8>) -> Result<Vec<u8>> {
    if !is_sealed(&stored) {
        return Ok(stored);
    }

    let secret = effective_secret(secret).ok_or(VaultError::BadEncryptionSecret)?;
    SymmetricCipher::new(secret)
        .decrypt(&stored[ENVELOPE_MAGIC.len()..])
        .map_err(|e| match e {
            CipherError::AuthenticationFailed => VaultError::BadEncryptionSecret,
            other => VaultError::Cipher(other),
        })
}
