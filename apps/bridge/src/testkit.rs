//! In-memory collaborators for exercising the bridge without a chat platform or remote instance.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vab_core::{BridgeConfig, ConfigHandle, ConversationRequest};
use vab_session::{SharedKvStore, shared_memory_store};
use vab_translator::{DeliveryError, MessageSink, OutboundMessage};

use crate::bridge::SessionBridge;
use crate::error::{OAuthError, RemoteError};
use crate::files::MemoryFileSource;
use crate::oauth::{OAuthClient, OAuthToken};
use crate::remote::{RemoteAgent, RemoteProfile};

/// 32 bytes, selecting AES-256-GCM.
pub const TEST_ENCRYPTION_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const TEST_WEBHOOK_SECRET: &str = "hook-secret";

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        instance_url: "https://instance.example".into(),
        site_url: "https://bridge.example".into(),
        webhook_secret: TEST_WEBHOOK_SECRET.into(),
        encryption_secret: TEST_ENCRYPTION_SECRET.into(),
        oauth_client_id: "client-id".into(),
        oauth_client_secret: "client-secret".into(),
        ..BridgeConfig::default()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub direct: Mutex<Vec<(String, OutboundMessage)>>,
    pub ephemeral: Mutex<Vec<(String, String, OutboundMessage)>>,
}

impl RecordingSink {
    /// Texts of the direct messages sent to `user_id`, oldest first.
    pub async fn texts_for(&self, user_id: &str) -> Vec<String> {
        self.direct
            .lock()
            .await
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, message)| message.text.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn direct_message(
        &self,
        user_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.direct
            .lock()
            .await
            .push((user_id.to_string(), message.clone()));
        Ok(())
    }

    async fn ephemeral_message(
        &self,
        user_id: &str,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.ephemeral.lock().await.push((
            user_id.to_string(),
            channel_id.to_string(),
            message.clone(),
        ));
        Ok(())
    }
}

pub struct MockRemoteAgent {
    pub sent: Mutex<Vec<(String, ConversationRequest)>>,
    pub profile: RemoteProfile,
}

impl MockRemoteAgent {
    pub fn new(remote_user_id: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            profile: RemoteProfile {
                user_id: remote_user_id.to_string(),
                user_name: Some("abel.tuter".into()),
            },
        }
    }
}

#[async_trait]
impl RemoteAgent for MockRemoteAgent {
    async fn send(&self, token: &str, request: &ConversationRequest) -> Result<(), RemoteError> {
        self.sent
            .lock()
            .await
            .push((token.to_string(), request.clone()));
        Ok(())
    }

    async fn current_user(&self, _token: &str) -> Result<RemoteProfile, RemoteError> {
        Ok(self.profile.clone())
    }
}

pub struct MockOAuthClient {
    pub token: OAuthToken,
    pub refreshed_token: OAuthToken,
    pub exchanged: Mutex<Vec<String>>,
    pub refreshed: Mutex<Vec<String>>,
}

impl MockOAuthClient {
    pub fn new(token: OAuthToken) -> Self {
        Self {
            refreshed_token: OAuthToken {
                access_token: format!("{}-refreshed", token.access_token),
                expires_at: None,
                ..token.clone()
            },
            token,
            exchanged: Mutex::new(Vec::new()),
            refreshed: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockOAuthClient {
    fn default() -> Self {
        Self::new(OAuthToken {
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            token_type: Some("Bearer".into()),
            expires_at: None,
        })
    }
}

#[async_trait]
impl OAuthClient for MockOAuthClient {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://instance.example/oauth_auth.do?state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<OAuthToken, OAuthError> {
        self.exchanged.lock().await.push(code.to_string());
        Ok(self.token.clone())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        self.refreshed.lock().await.push(refresh_token.to_string());
        Ok(self.refreshed_token.clone())
    }
}

/// A bridge wired to in-memory collaborators, with handles to inspect them.
pub struct TestBridge {
    pub bridge: Arc<SessionBridge>,
    pub config: Arc<ConfigHandle>,
    pub kv: SharedKvStore,
    pub sink: Arc<RecordingSink>,
    pub remote: Arc<MockRemoteAgent>,
    pub oauth: Arc<MockOAuthClient>,
    pub files: Arc<MemoryFileSource>,
}

impl TestBridge {
    pub fn new() -> Self {
        Self::with(test_config(), MockOAuthClient::default())
    }

    pub fn with(config: BridgeConfig, oauth: MockOAuthClient) -> Self {
        let config = Arc::new(ConfigHandle::new(config));
        let kv = shared_memory_store();
        let sink = Arc::new(RecordingSink::default());
        let remote = Arc::new(MockRemoteAgent::new("remote-1"));
        let oauth = Arc::new(oauth);
        let files = Arc::new(MemoryFileSource::new());
        let bridge = Arc::new(SessionBridge::new(
            config.clone(),
            kv.clone(),
            remote.clone(),
            oauth.clone(),
            sink.clone(),
            files.clone(),
        ));
        Self {
            bridge,
            config,
            kv,
            sink,
            remote,
            oauth,
            files,
        }
    }

    /// Links `user_id` through the full OAuth2 flow and returns the remote user id.
    pub async fn link(&self, user_id: &str) -> String {
        let url = self
            .bridge
            .begin_connect(user_id)
            .await
            .unwrap_or_else(|err| panic!("begin_connect failed: {err}"));
        let state = url
            .split("state=")
            .nth(1)
            .unwrap_or_else(|| panic!("no state in {url}"))
            .to_string();
        self.bridge
            .complete_connect(user_id, "code-1", &state)
            .await
            .unwrap_or_else(|err| panic!("complete_connect failed: {err}"))
            .remote_user_id
    }
}

impl Default for TestBridge {
    fn default() -> Self {
        Self::new()
    }
}
