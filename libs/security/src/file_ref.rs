use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::cipher::{CipherError, TokenCipher};

#[derive(Debug, Error)]
pub enum FileRefError {
    #[error("file reference has expired")]
    Expired,
    #[error("file reference could not be decrypted: {0}")]
    Cipher(#[from] CipherError),
    #[error("file reference payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FileRefError {
    /// Expired references are indistinguishable from absent files for callers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileRefError::Expired)
    }
}

/// Time-boxed pointer to a chat file, sealed into the path of a generated download URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub file_id: String,
    /// Unix timestamp (seconds) after which the reference is no longer honoured.
    pub expires_at: i64,
}

impl FileReference {
    pub fn new(file_id: impl Into<String>, ttl: Duration, now: OffsetDateTime) -> Self {
        Self {
            file_id: file_id.into(),
            expires_at: (now + ttl).unix_timestamp(),
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() > self.expires_at
    }

    pub fn seal(&self, cipher: &TokenCipher) -> Result<String, FileRefError> {
        let payload = serde_json::to_vec(self)?;
        Ok(cipher.seal(&payload)?)
    }

    /// Decrypts `token` and rejects it when it has expired relative to `now`.
    pub fn open(
        token: &str,
        cipher: &TokenCipher,
        now: OffsetDateTime,
    ) -> Result<Self, FileRefError> {
        let payload = cipher.open(token)?;
        let reference: FileReference = serde_json::from_slice(&payload)?;
        if reference.is_expired_at(now) {
            return Err(FileRefError::Expired);
        }
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn cipher() -> TokenCipher {
        TokenCipher::new("0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn opens_before_expiry() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let reference = FileReference::new("file-1", Duration::from_secs(300), now);
        let token = reference.seal(&cipher()).unwrap();

        let opened = FileReference::open(&token, &cipher(), now).unwrap();
        assert_eq!(opened, reference);
        assert_eq!(opened.expires_at, now.unix_timestamp() + 300);
    }

    #[test]
    fn expired_reference_is_not_found_even_though_it_decrypts() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let token = FileReference::new("file-1", Duration::from_secs(300), now)
            .seal(&cipher())
            .unwrap();

        let later = datetime!(2024-05-01 12:05:01 UTC);
        let err = FileReference::open(&token, &cipher(), later).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn reference_is_valid_up_to_the_expiry_second() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let token = FileReference::new("file-1", Duration::from_secs(300), now)
            .seal(&cipher())
            .unwrap();
        let boundary = datetime!(2024-05-01 12:05 UTC);
        assert!(FileReference::open(&token, &cipher(), boundary).is_ok());
    }

    #[test]
    fn tampered_token_is_a_cipher_failure() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut token = FileReference::new("file-1", Duration::from_secs(300), now)
            .seal(&cipher())
            .unwrap();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });

        let err = FileReference::open(&token, &cipher(), now).unwrap_err();
        assert!(matches!(err, FileRefError::Cipher(_)));
        assert!(!err.is_not_found());
    }
}
