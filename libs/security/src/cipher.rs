//! Authenticated encryption for OAuth2 tokens at rest and file references embedded in URLs.
//!
//! Envelope layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`. The key is the
//! configured secret's bytes, which must be 16 (AES-128-GCM), 24 (AES-192-GCM) or 32
//! (AES-256-GCM) long.

use std::fmt;

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, AesGcm,
    aead::{Aead, KeyInit, OsRng, consts::U12, rand_core::RngCore as _},
    aes::Aes192,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use thiserror::Error;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption secret must be 16, 24 or 32 bytes long, got {0}")]
    InvalidKeyLength(usize),
    #[error("ciphertext is too short ({0} bytes)")]
    Truncated(usize),
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
    #[error("ciphertext encoding is invalid")]
    Encoding,
}

#[derive(Clone)]
enum Engine {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

#[derive(Clone)]
pub struct TokenCipher {
    engine: Engine,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self.engine {
            Engine::Aes128(_) => "aes-128-gcm",
            Engine::Aes192(_) => "aes-192-gcm",
            Engine::Aes256(_) => "aes-256-gcm",
        };
        f.debug_struct("TokenCipher")
            .field("engine", &variant)
            .finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(secret: &str) -> Result<Self, CipherError> {
        Self::from_key(secret.as_bytes())
    }

    pub fn from_key(key: &[u8]) -> Result<Self, CipherError> {
        let engine = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Engine::Aes128),
            24 => Aes192Gcm::new_from_slice(key).map(Engine::Aes192),
            32 => Aes256Gcm::new_from_slice(key).map(Engine::Aes256),
            other => return Err(CipherError::InvalidKeyLength(other)),
        }
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { engine })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = match &self.engine {
            Engine::Aes128(cipher) => cipher.encrypt((&nonce).into(), plaintext),
            Engine::Aes192(cipher) => cipher.encrypt((&nonce).into(), plaintext),
            Engine::Aes256(cipher) => cipher.encrypt((&nonce).into(), plaintext),
        }
        .map_err(|_| CipherError::Encryption)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }

    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        if envelope.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated(envelope.len()));
        }
        let (nonce, sealed) = envelope.split_at(NONCE_LEN);
        match &self.engine {
            Engine::Aes128(cipher) => cipher.decrypt(nonce.into(), sealed),
            Engine::Aes192(cipher) => cipher.decrypt(nonce.into(), sealed),
            Engine::Aes256(cipher) => cipher.decrypt(nonce.into(), sealed),
        }
        .map_err(|_| CipherError::Authentication)
    }

    /// Encrypts and encodes as unpadded URL-safe base64, usable in paths and store values.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        Ok(URL_SAFE_NO_PAD.encode(self.encrypt(plaintext)?))
    }

    pub fn open(&self, encoded: &str) -> Result<Vec<u8>, CipherError> {
        let envelope = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CipherError::Encoding)?;
        self.decrypt(&envelope)
    }
}
