use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;

/// Separates the random component from the local user id inside a state value.
pub const STATE_DELIMITER: char = '_';
const STATE_RANDOM_LEN: usize = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateTokenError {
    #[error("oauth2 state is malformed")]
    Malformed,
    #[error("oauth2 state belongs to a different user")]
    UserMismatch,
}

/// One-time OAuth2 state value: `<random>_<local user id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    raw: String,
    user_id: String,
}

impl OAuthState {
    pub fn generate(user_id: &str) -> Self {
        let random: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self {
            raw: format!("{random}{STATE_DELIMITER}{user_id}"),
            user_id: user_id.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StateTokenError> {
        let (random, user_id) = raw
            .split_once(STATE_DELIMITER)
            .ok_or(StateTokenError::Malformed)?;
        if random.is_empty() || user_id.is_empty() {
            return Err(StateTokenError::Malformed);
        }
        Ok(Self {
            raw: raw.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Rejects a completion attempted by anyone other than the user who started it.
    pub fn ensure_owner(&self, user_id: &str) -> Result<(), StateTokenError> {
        if crate::constant_time_eq(self.user_id.as_bytes(), user_id.as_bytes()) {
            Ok(())
        } else {
            Err(StateTokenError::UserMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_state_embeds_user_id() {
        let state = OAuthState::generate("user1abc");
        let (random, user) = state.as_str().split_once('_').unwrap();
        assert_eq!(random.len(), STATE_RANDOM_LEN);
        assert!(random.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(user, "user1abc");
        assert_eq!(OAuthState::parse(state.as_str()).unwrap(), state);
    }

    #[test]
    fn states_are_unique() {
        assert_ne!(OAuthState::generate("u"), OAuthState::generate("u"));
    }

    #[test]
    fn parse_rejects_malformed_values() {
        for raw in ["", "nodelimiter", "_user", "random_"] {
            assert_eq!(
                OAuthState::parse(raw).unwrap_err(),
                StateTokenError::Malformed,
                "{raw:?}"
            );
        }
    }

    #[test]
    fn ensure_owner_compares_embedded_user() {
        let state = OAuthState::parse("abc_user1").unwrap();
        assert!(state.ensure_owner("user1").is_ok());
        assert_eq!(
            state.ensure_owner("user2").unwrap_err(),
            StateTokenError::UserMismatch
        );
    }
}
