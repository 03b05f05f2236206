//! Authenticated encryption for credential material at rest.
//!
//! Tokens are sealed with AES-256-GCM under a process-wide key supplied by
//! configuration. The stored form is base64 over `nonce || ciphertext`;
//! every encryption draws a fresh 96-bit nonce from the OS RNG. Decryption
//! fails closed: tampered input, a wrong key, or a truncated record all
//! surface as an integrity error, never as garbage plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Errors from sealing or opening stored tokens.
#[derive(Debug, Error, PartialEq)]
pub enum CipherError {
    /// The supplied key material has the wrong length.
    #[error("token key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The stored value is not valid base64.
    #[error("stored ciphertext is not valid base64: {0}")]
    Encoding(String),

    /// Authentication failed: the ciphertext was tampered with, truncated,
    /// or sealed under a different key.
    #[error("stored ciphertext failed authentication")]
    Integrity,

    /// Sealing failed. Does not occur for in-memory payloads of sane size.
    #[error("encryption failed")]
    Encrypt,
}

/// Symmetric cipher for token values.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from 32 bytes of key material.
    ///
    /// The local copy of the key is zeroized once the cipher state is
    /// initialized.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let key_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
            <[u8; 32]>::try_from(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?,
        );
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes.as_ref()));
        Ok(Self { cipher })
    }

    /// Seal a token value for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Open a stored token value.
    pub fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let raw = BASE64
            .decode(stored.as_bytes())
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Integrity);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Integrity)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Integrity)
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}
