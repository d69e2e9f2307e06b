use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use vab_core::SharedConfig;
use vab_telemetry::record_oauth_error;

use crate::error::OAuthError;

pub const AUTHORIZE_PATH: &str = "oauth_auth.do";
pub const TOKEN_PATH: &str = "oauth_token.do";

/// Tokens expiring within this many seconds are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 30;

/// OAuth2 token as persisted, sealed, inside a session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Unix timestamp (seconds); `None` means the token does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl OAuthToken {
    pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now.unix_timestamp() + EXPIRY_SKEW_SECS >= expires_at)
    }

    fn from_response(raw: TokenResponse, now: OffsetDateTime) -> Self {
        Self {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            token_type: raw.token_type,
            expires_at: raw.expires_in.map(|secs| now.unix_timestamp() + secs),
        }
    }
}

#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// URL the user visits to grant access; `state` is echoed back on completion.
    fn authorize_url(&self, state: &str) -> String;

    async fn exchange(&self, code: &str) -> Result<OAuthToken, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError>;
}

pub struct ReqwestOAuthClient {
    client: Client,
    config: SharedConfig,
}

impl ReqwestOAuthClient {
    pub fn new(client: Client, config: SharedConfig) -> Self {
        Self { client, config }
    }

    async fn token_request(
        &self,
        grant: &'static str,
        params: &[(&str, &str)],
    ) -> Result<OAuthToken, OAuthError> {
        let cfg = self.config.snapshot();
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant),
            ("client_id", cfg.oauth_client_id.as_str()),
            ("client_secret", cfg.oauth_client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .client
            .post(cfg.instance_path(TOKEN_PATH))
            .timeout(cfg.request_timeout)
            .form(&form)
            .send()
            .await
            .map_err(|err| {
                record_oauth_error("transport", grant);
                OAuthError::Transport(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            record_oauth_error("rejected", grant);
            let body = response.text().await.unwrap_or_default();
            let parsed: Option<TokenErrorResponse> = serde_json::from_str(&body).ok();
            return Err(match parsed {
                Some(err) => OAuthError::Rejected {
                    status: status.as_u16(),
                    error: err.error,
                    description: err.error_description,
                },
                None => OAuthError::Rejected {
                    status: status.as_u16(),
                    error: status.to_string(),
                    description: None,
                },
            });
        }

        let raw: TokenResponse = response
            .json()
            .await
            .map_err(|err| OAuthError::Decode(err.to_string()))?;
        Ok(OAuthToken::from_response(raw, OffsetDateTime::now_utc()))
    }
}

#[async_trait]
impl OAuthClient for ReqwestOAuthClient {
    fn authorize_url(&self, state: &str) -> String {
        let cfg = self.config.snapshot();
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}",
            cfg.instance_path(AUTHORIZE_PATH),
            urlencoding::encode(&cfg.oauth_client_id),
            urlencoding::encode(&cfg.oauth_redirect_url()),
            urlencoding::encode(state),
        )
    }

    async fn exchange(&self, code: &str) -> Result<OAuthToken, OAuthError> {
        let redirect = self.config.snapshot().oauth_redirect_url();
        self.token_request(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect.as_str())],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        let mut token = self
            .token_request("refresh_token", &[("refresh_token", refresh_token)])
            .await?;
        // Some servers omit the refresh token when it is unchanged.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn refresh_is_due_shortly_before_expiry() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let token = OAuthToken {
            access_token: "a".into(),
            refresh_token: None,
            token_type: None,
            expires_at: Some(now.unix_timestamp() + 10),
        };
        assert!(token.needs_refresh(now));
        let fresh = OAuthToken {
            expires_at: Some(now.unix_timestamp() + 3600),
            ..token.clone()
        };
        assert!(!fresh.needs_refresh(now));
        let eternal = OAuthToken {
            expires_at: None,
            ..token
        };
        assert!(!eternal.needs_refresh(now));
    }
}
