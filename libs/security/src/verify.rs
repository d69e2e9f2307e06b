use std::borrow::Cow;

use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    #[error("webhook secret is not configured")]
    Unconfigured,
    #[error("request carries no webhook secret")]
    Missing,
    #[error("webhook secret does not match")]
    Mismatch,
}

/// Compares two byte strings without exiting early on the first differing byte.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.ct_eq(right).into()
}

/// Checks a webhook secret presented by the remote agent.
///
/// Some clients encode the secret more than once in transit, so a mismatching candidate is
/// query-unescaped and compared again until it matches or unescaping no longer changes it.
///
/// ```
/// use vab_security::verify_secret;
///
/// assert!(verify_secret("a/b+c", "a%252Fb%252Bc").is_ok());
/// assert!(verify_secret("a/b+c", "a%2Fb").is_err());
/// assert!(verify_secret("", "").is_err());
/// ```
pub fn verify_secret(expected: &str, candidate: &str) -> Result<(), VerifyFailure> {
    if expected.is_empty() {
        return Err(VerifyFailure::Unconfigured);
    }
    if candidate.is_empty() {
        return Err(VerifyFailure::Missing);
    }

    let mut current = Cow::Borrowed(candidate);
    loop {
        if constant_time_eq(expected.as_bytes(), current.as_bytes()) {
            return Ok(());
        }
        let Some(decoded) = query_unescape(&current) else {
            return Err(VerifyFailure::Mismatch);
        };
        if decoded == current.as_ref() {
            return Err(VerifyFailure::Mismatch);
        }
        current = Cow::Owned(decoded);
    }
}

// Every step that changes the input either drops a `+` or shortens it, so the loop above
// always reaches a fixed point.
fn query_unescape(value: &str) -> Option<String> {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .ok()
        .map(|decoded| decoded.into_owned())
}
