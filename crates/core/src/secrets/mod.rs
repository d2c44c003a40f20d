//! Credential sealing.
//!
//! Channel credentials are stored encrypted on the channel row. The cipher is
//! ChaCha20-Poly1305 with a key derived from `ENCRYPTION_KEY` via
//! HKDF-SHA256. Blob format: `base64(nonce || ciphertext)`.

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::errors::{Error, Result};

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &[u8] = b"stockclerk.channel-credentials.v1";

/// Seals and opens credential blobs with a process-wide key.
pub struct SecretBox {
    cipher: ChaCha20Poly1305,
}

impl SecretBox {
    /// Derive the sealing key from the configured `ENCRYPTION_KEY`.
    pub fn new(encryption_key: &str) -> Result<Self> {
        if encryption_key.len() < 32 {
            return Err(Error::Secret(
                "encryption key must be at least 32 characters".to_string(),
            ));
        }

        let hkdf = Hkdf::<Sha256>::new(None, encryption_key.as_bytes());
        let mut key_bytes = [0u8; 32];
        hkdf.expand(KEY_CONTEXT, &mut key_bytes)
            .map_err(|e| Error::Secret(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key_bytes)),
        })
    }

    /// Encrypt a plaintext into an opaque blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::Secret(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &str) -> Result<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .map_err(|e| Error::Secret(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Secret("credential blob too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Secret("credential blob failed authentication".to_string()))
    }
}
