use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use vab_core::{ConversationRequest, SharedConfig};
use vab_telemetry::record_remote_error;

use crate::error::RemoteError;

pub const INTEGRATION_PATH: &str = "api/sn_va_as_service/bot/integration";
pub const CURRENT_USER_PATH: &str = "api/now/ui/user/current_user";

const MAX_ERROR_BODY: usize = 512;

/// Identity of the linked user on the remote instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProfile {
    pub user_id: String,
    pub user_name: Option<String>,
}

#[async_trait]
pub trait RemoteAgent: Send + Sync {
    /// Posts a request envelope on behalf of the token's owner.
    async fn send(&self, token: &str, request: &ConversationRequest) -> Result<(), RemoteError>;

    async fn current_user(&self, token: &str) -> Result<RemoteProfile, RemoteError>;
}

pub struct ReqwestRemoteAgent {
    client: Client,
    config: SharedConfig,
}

impl ReqwestRemoteAgent {
    pub fn new(client: Client, config: SharedConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Deserialize)]
struct CurrentUserEnvelope {
    result: CurrentUser,
}

#[derive(Deserialize)]
struct CurrentUser {
    user_sys_id: String,
    #[serde(default)]
    user_name: Option<String>,
}

#[async_trait]
impl RemoteAgent for ReqwestRemoteAgent {
    async fn send(&self, token: &str, request: &ConversationRequest) -> Result<(), RemoteError> {
        let cfg = self.config.snapshot();
        let response = self
            .client
            .post(cfg.instance_path(INTEGRATION_PATH))
            .timeout(cfg.request_timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error("integration", err))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!(request_id = %request.request_id, "remote agent accepted request without body");
            return Ok(());
        }
        if !status.is_success() {
            return Err(application_error("integration", response).await);
        }
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<RemoteProfile, RemoteError> {
        let cfg = self.config.snapshot();
        let response = self
            .client
            .get(cfg.instance_path(CURRENT_USER_PATH))
            .timeout(cfg.request_timeout)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| transport_error("current_user", err))?;

        if !response.status().is_success() {
            return Err(application_error("current_user", response).await);
        }
        let envelope: CurrentUserEnvelope = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(RemoteProfile {
            user_id: envelope.result.user_sys_id,
            user_name: envelope.result.user_name,
        })
    }
}

fn transport_error(endpoint: &'static str, err: reqwest::Error) -> RemoteError {
    record_remote_error("transport", endpoint, None);
    RemoteError::Transport(err)
}

async fn application_error(endpoint: &'static str, response: reqwest::Response) -> RemoteError {
    let status = response.status();
    record_remote_error("application", endpoint, Some(status.as_u16()));
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable>".into());
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => RemoteError::Application {
            status: status.as_u16(),
            message: envelope.error.message,
            detail: envelope.error.detail,
        },
        Err(_) => RemoteError::Application {
            status: status.as_u16(),
            message: truncate(body, MAX_ERROR_BODY),
            detail: None,
        },
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".into(), 2), "h");
        assert_eq!(truncate("short".into(), 10), "short");
    }
}
