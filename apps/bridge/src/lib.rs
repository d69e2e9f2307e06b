//! Virtual agent bridge service.
//!
//! Accepts responses pushed by the remote agent, renders them into chat messages, links chat
//! accounts to remote accounts over OAuth2 and forwards what users type back to the agent.
pub mod bridge;
pub mod error;
pub mod files;
pub mod http;
pub mod oauth;
pub mod remote;
pub mod sink;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use bridge::{BridgeState, ChatFile, ChatMessage, SessionBridge, validate_date_input};
pub use error::{BridgeError, FileSourceError, GENERIC_FAILURE_TEXT, OAuthError, RemoteError};
pub use files::{DirFileSource, FileSource, MemoryFileSource, sniff_content_type};
pub use http::{AppState, CallerId, USER_ID_HEADER, build_router};
pub use oauth::{OAuthClient, OAuthToken, ReqwestOAuthClient};
pub use remote::{RemoteAgent, RemoteProfile, ReqwestRemoteAgent};
pub use sink::HttpMessageSink;
