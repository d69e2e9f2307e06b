use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vab_core::DecodeError;
use vab_security::{CipherError, FileRefError, StateTokenError, VerifyFailure};
use vab_session::StoreError;
use vab_translator::DeliveryError;

/// Text shown to chat users when something outside their control failed.
pub const GENERIC_FAILURE_TEXT: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote agent transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("remote agent returned {status}: {message}")]
    Application {
        status: u16,
        message: String,
        detail: Option<String>,
    },
    #[error("remote agent response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("oauth2 transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("oauth2 endpoint rejected the request ({status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },
    #[error("oauth2 response could not be decoded: {0}")]
    Decode(String),
    #[error("stored token has no refresh token")]
    NotRefreshable,
}

#[derive(Debug, Error)]
pub enum FileSourceError {
    #[error("file {0} does not exist")]
    NotFound(String),
    #[error("file {0} has an invalid id")]
    InvalidId(String),
    #[error("file storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("request carries no caller identity")]
    MissingIdentity,
    #[error("webhook rejected: {0}")]
    Forbidden(#[from] VerifyFailure),
    #[error("oauth2 state is unknown, already used or expired")]
    UnknownState,
    #[error(transparent)]
    StateToken(#[from] StateTokenError),
    #[error("user {0} is not connected")]
    NotLinked(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    FileReference(#[from] FileRefError),
    #[error(transparent)]
    FileSource(#[from] FileSourceError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("{0}")]
    Validation(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::MissingIdentity => StatusCode::UNAUTHORIZED,
            BridgeError::Forbidden(_) | BridgeError::UnknownState => StatusCode::FORBIDDEN,
            BridgeError::StateToken(StateTokenError::UserMismatch) => StatusCode::FORBIDDEN,
            BridgeError::StateToken(StateTokenError::Malformed) => StatusCode::BAD_REQUEST,
            BridgeError::NotLinked(_) => StatusCode::NOT_FOUND,
            BridgeError::Store(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            BridgeError::FileReference(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            BridgeError::FileReference(_) => StatusCode::BAD_REQUEST,
            BridgeError::FileSource(FileSourceError::NotFound(_)) => StatusCode::NOT_FOUND,
            BridgeError::FileSource(FileSourceError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::Remote(_) | BridgeError::OAuth(_) | BridgeError::Delivery(_) => {
                StatusCode::BAD_GATEWAY
            }
            BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::BodyRead(_)
            | BridgeError::Decode(_)
            | BridgeError::Store(_)
            | BridgeError::Cipher(_)
            | BridgeError::FileSource(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == StatusCode::NOT_FOUND
    }

    /// Text safe to show a chat user. Only validation failures carry specifics.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Validation(text) => text.clone(),
            BridgeError::NotLinked(_) => {
                "Your account is not connected yet. Connect it to start chatting.".into()
            }
            BridgeError::UnknownState => {
                "This connection link has expired. Please start connecting again.".into()
            }
            BridgeError::OAuth(OAuthError::NotRefreshable) => {
                "Your connection has expired. Disconnect and connect your account again.".into()
            }
            _ => GENERIC_FAILURE_TEXT.into(),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (
            status,
            Json(json!({ "status": "error", "error": self.user_message() })),
        )
            .into_response()
    }
}
