//! AES-256-GCM keyed from an arbitrary-length secret
//!
//! Wire layout of every ciphertext produced here: `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::core::error::CipherError;

/// Nonce length mandated by AES-GCM
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended by AES-GCM
pub const TAG_LEN: usize = 16;

/// Symmetric AEAD cipher bound to one secret
#[derive(Clone)]
pub struct SymmetricCipher {
    aead: Aes256Gcm,
}

impl SymmetricCipher {
    /// Derive the key as SHA-256 of the secret, so any secret length works
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            aead: Aes256Gcm::new(key),
        }
    }

    /// Seal `plaintext` under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Open `nonce || ciphertext`; never returns partial plaintext
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::AuthenticationFailed);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::AuthenticationFailed)
    }
}

/// One-shot encrypt with a secret
pub fn encrypt(secret: &str, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    SymmetricCipher::new(secret).encrypt(plaintext)
}

/// One-shot decrypt with a secret
pub fn decrypt(secret: &str, data: &[u8]) -> Result<Vec<u8>, CipherError> {
    SymmetricCipher::new(secret).decrypt(data)
}
