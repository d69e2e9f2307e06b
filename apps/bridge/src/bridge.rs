//! Per-user conversation state machine between the chat platform and the remote agent.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{info, instrument, warn};
use vab_core::{
    BridgeConfig, ConversationRequest, DateKind, MessageAttachment, SharedConfig, decode_event,
};
use vab_security::{FileReference, OAuthState, TokenCipher, verify_secret};
use vab_session::{
    FlagStore, OAuthStateStore, SessionRecord, SessionStore, SharedKvStore, StoreError,
};
use vab_telemetry::record_link;
use vab_translator::{
    Action, ActionKind, Attachment, BatchReport, Integration, MessageSink, OutboundMessage,
    RenderContext, render_batch,
};

use crate::error::{BridgeError, OAuthError};
use crate::files::{BINARY_CONTENT_TYPE, FileSource, sniff_content_type};
use crate::oauth::{OAuthClient, OAuthToken};
use crate::remote::RemoteAgent;

pub const STILL_CONNECTED_TEXT: &str = "You're still connected to the virtual agent.";
pub const DISCONNECTED_TEXT: &str = "Successfully disconnected from the virtual agent.";
pub const CONNECTED_TEXT: &str =
    "You're now connected to the virtual agent. Send a message to get started.";
pub const CONFIRM_DISCONNECT_TEXT: &str =
    "Are you sure you want to disconnect from the virtual agent?";
pub const ALREADY_CONNECTED_TEXT: &str =
    "Your account is already connected. Send the disconnect keyword to unlink it first.";
pub const NO_PENDING_DISCONNECT_TEXT: &str = "There is no disconnect request waiting for an answer.";

const LINK_PENDING_PREFIX: &str = "link_pending_";
const DISCONNECT_PENDING_PREFIX: &str = "disconnect_pending_";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");
const DATE_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unlinked,
    LinkPending,
    Linked,
    DisconnectConfirming,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Unlinked => "unlinked",
            BridgeState::LinkPending => "link_pending",
            BridgeState::Linked => "linked",
            BridgeState::DisconnectConfirming => "disconnect_confirming",
        }
    }
}

/// File a user attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Chat message a user sent to the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Vec<ChatFile>,
}

impl ChatMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
        }
    }
}

pub struct SessionBridge {
    config: SharedConfig,
    sessions: SessionStore,
    states: OAuthStateStore,
    link_pending: FlagStore,
    disconnecting: FlagStore,
    remote: Arc<dyn RemoteAgent>,
    oauth: Arc<dyn OAuthClient>,
    sink: Arc<dyn MessageSink>,
    files: Arc<dyn FileSource>,
}

impl SessionBridge {
    pub fn new(
        config: SharedConfig,
        kv: SharedKvStore,
        remote: Arc<dyn RemoteAgent>,
        oauth: Arc<dyn OAuthClient>,
        sink: Arc<dyn MessageSink>,
        files: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            config,
            sessions: SessionStore::new(kv.clone()),
            states: OAuthStateStore::new(kv.clone()),
            link_pending: FlagStore::new(kv.clone(), LINK_PENDING_PREFIX),
            disconnecting: FlagStore::new(kv, DISCONNECT_PENDING_PREFIX),
            remote,
            oauth,
            sink,
            files,
        }
    }

    pub fn config(&self) -> Arc<BridgeConfig> {
        self.config.snapshot()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs `fut` under the configured request timeout. Timing out drops the future, abandoning
    /// whatever it was doing.
    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, E>>,
        BridgeError: From<E>,
    {
        let after = self.config.snapshot().request_timeout;
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(BridgeError::from),
            Err(_) => Err(BridgeError::Timeout { operation, after }),
        }
    }

    async fn find_session(&self, user_id: &str) -> Result<Option<SessionRecord>, BridgeError> {
        match self
            .bounded("session lookup", self.sessions.load_by_local(user_id))
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(BridgeError::Store(StoreError::NotFound)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn require_session(&self, user_id: &str) -> Result<SessionRecord, BridgeError> {
        self.find_session(user_id)
            .await?
            .ok_or_else(|| BridgeError::NotLinked(user_id.to_string()))
    }

    pub async fn state_of(&self, user_id: &str) -> Result<BridgeState, BridgeError> {
        if self.find_session(user_id).await?.is_some() {
            let confirming = self
                .bounded("flag lookup", self.disconnecting.is_raised(user_id))
                .await?;
            return Ok(if confirming {
                BridgeState::DisconnectConfirming
            } else {
                BridgeState::Linked
            });
        }
        let pending = self
            .bounded("flag lookup", self.link_pending.is_raised(user_id))
            .await?;
        Ok(if pending {
            BridgeState::LinkPending
        } else {
            BridgeState::Unlinked
        })
    }

    async fn direct(&self, user_id: &str, message: OutboundMessage) -> Result<(), BridgeError> {
        self.bounded("direct message", self.sink.direct_message(user_id, &message))
            .await
    }

    /// Tells the user something failed, without internal detail. Delivery problems are only
    /// logged.
    async fn report_failure(&self, user_id: &str, err: &BridgeError) {
        if matches!(err, BridgeError::Delivery(_)) {
            return;
        }
        let notice = OutboundMessage::text(err.user_message());
        if let Err(notify_err) = self.direct(user_id, notice).await {
            warn!(user_id, error = %notify_err, "could not tell user about failure");
        }
    }

    /// Handles a message the user sent to the bot and returns the user's resulting state.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn handle_chat_message(
        &self,
        user_id: &str,
        message: &ChatMessage,
    ) -> Result<BridgeState, BridgeError> {
        let result = self.route_chat_message(user_id, message).await;
        if let Err(err) = &result {
            warn!(error = %err, "chat message not handled");
            self.report_failure(user_id, err).await;
        }
        result
    }

    async fn route_chat_message(
        &self,
        user_id: &str,
        message: &ChatMessage,
    ) -> Result<BridgeState, BridgeError> {
        let cfg = self.config.snapshot();
        match self.state_of(user_id).await? {
            BridgeState::Unlinked => {
                let text = format!(
                    "Hi! To chat with the virtual agent, connect your account: [Connect]({})",
                    cfg.site_path("oauth2/connect")
                );
                self.direct(user_id, OutboundMessage::text(text)).await?;
                Ok(BridgeState::Unlinked)
            }
            BridgeState::LinkPending => {
                let text = format!(
                    "Finish connecting your account to continue: [Connect]({})",
                    cfg.site_path("oauth2/connect")
                );
                self.direct(user_id, OutboundMessage::text(text)).await?;
                Ok(BridgeState::LinkPending)
            }
            BridgeState::DisconnectConfirming => {
                self.answer_disconnect(user_id, is_affirmative(&message.text))
                    .await?;
                self.state_of(user_id).await
            }
            BridgeState::Linked => {
                if is_keyword(&message.text, &cfg.disconnect_keyword) {
                    self.bounded("flag update", self.disconnecting.raise(user_id, None))
                        .await?;
                    self.direct(user_id, disconnect_prompt(&cfg)).await?;
                    return Ok(BridgeState::DisconnectConfirming);
                }
                self.forward_chat(user_id, &cfg, message).await?;
                Ok(BridgeState::Linked)
            }
        }
    }

    /// Resolves a pending disconnect. Returns the text sent to the user.
    #[instrument(skip_all, fields(user_id = %user_id, confirmed = confirmed))]
    pub async fn answer_disconnect(
        &self,
        user_id: &str,
        confirmed: bool,
    ) -> Result<String, BridgeError> {
        let pending = self
            .bounded("flag lookup", self.disconnecting.is_raised(user_id))
            .await?;
        if !pending {
            return Err(BridgeError::Validation(NO_PENDING_DISCONNECT_TEXT.into()));
        }
        self.bounded("flag update", self.disconnecting.clear(user_id))
            .await?;

        if !confirmed {
            self.direct(user_id, OutboundMessage::text(STILL_CONNECTED_TEXT))
                .await?;
            return Ok(STILL_CONNECTED_TEXT.into());
        }

        let record = self.require_session(user_id).await?;
        self.bounded("session delete", self.sessions.delete(&record))
            .await?;
        record_link("disconnected");
        info!(remote_user_id = %record.remote_user_id, "account disconnected");
        self.direct(user_id, OutboundMessage::text(DISCONNECTED_TEXT))
            .await?;
        Ok(DISCONNECTED_TEXT.into())
    }

    /// Starts account linking and returns the authorization URL to send the user to.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn begin_connect(&self, user_id: &str) -> Result<String, BridgeError> {
        if self.find_session(user_id).await?.is_some() {
            return Err(BridgeError::Validation(ALREADY_CONNECTED_TEXT.into()));
        }
        let cfg = self.config.snapshot();
        let state = OAuthState::generate(user_id);
        self.bounded(
            "oauth2 state save",
            self.states.put(state.as_str(), cfg.state_ttl),
        )
        .await?;
        self.bounded(
            "flag update",
            self.link_pending.raise(user_id, Some(cfg.state_ttl)),
        )
        .await?;
        record_link("started");
        Ok(self.oauth.authorize_url(state.as_str()))
    }

    /// Completes account linking. Nothing is persisted unless every step succeeds.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn complete_connect(
        &self,
        user_id: &str,
        code: &str,
        state: &str,
    ) -> Result<SessionRecord, BridgeError> {
        let record = match self.link_account(user_id, code, state).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "account linking rejected");
                record_link("rejected");
                return Err(err);
            }
        };
        record_link("linked");
        info!(remote_user_id = %record.remote_user_id, "account linked");
        self.after_link(&record).await;
        Ok(record)
    }

    async fn link_account(
        &self,
        user_id: &str,
        code: &str,
        state: &str,
    ) -> Result<SessionRecord, BridgeError> {
        let cfg = self.config.snapshot();
        match self
            .bounded("oauth2 state lookup", self.states.consume(state))
            .await
        {
            Ok(()) => {}
            Err(BridgeError::Store(StoreError::NotFound)) => return Err(BridgeError::UnknownState),
            Err(err) => return Err(err),
        }
        OAuthState::parse(state)?.ensure_owner(user_id)?;
        // A second pending link must not replace the session and orphan its remote key.
        if self.find_session(user_id).await?.is_some() {
            return Err(BridgeError::Validation(ALREADY_CONNECTED_TEXT.into()));
        }

        let token = self
            .bounded("oauth2 code exchange", self.oauth.exchange(code))
            .await?;
        let profile = self
            .bounded(
                "remote profile lookup",
                self.remote.current_user(&token.access_token),
            )
            .await?;
        let cipher = TokenCipher::new(&cfg.encryption_secret)?;
        let record = SessionRecord {
            local_user_id: user_id.to_string(),
            remote_user_id: profile.user_id,
            remote_username: profile.user_name,
            encrypted_token: seal_token(&cipher, &token)?,
            linked_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        self.bounded("session save", self.sessions.save(&record))
            .await?;

        if let Err(err) = self
            .bounded("flag update", self.link_pending.clear(user_id))
            .await
        {
            warn!(error = %err, "link pending flag left to expire");
        }
        Ok(record)
    }

    async fn after_link(&self, record: &SessionRecord) {
        let user_id = record.local_user_id.as_str();
        if let Err(err) = self.direct(user_id, OutboundMessage::text(CONNECTED_TEXT)).await {
            warn!(user_id, error = %err, "could not confirm connection to user");
        }
        let request = ConversationRequest::start(
            new_request_id(),
            &record.remote_user_id,
            OffsetDateTime::now_utc().unix_timestamp(),
        );
        if let Err(err) = self.send_as(record, request).await {
            warn!(user_id, error = %err, "could not start conversation");
        }
    }

    /// Decrypts the record's token, refreshing and re-saving it first when it is about to expire.
    async fn usable_token(&self, record: &SessionRecord) -> Result<OAuthToken, BridgeError> {
        let cfg = self.config.snapshot();
        let cipher = TokenCipher::new(&cfg.encryption_secret)?;
        let token = open_token(&cipher, &record.encrypted_token)?;
        if !token.needs_refresh(OffsetDateTime::now_utc()) {
            return Ok(token);
        }
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(OAuthError::NotRefreshable.into());
        };
        let refreshed = self
            .bounded("oauth2 token refresh", self.oauth.refresh(refresh_token))
            .await?;
        let updated = SessionRecord {
            encrypted_token: seal_token(&cipher, &refreshed)?,
            ..record.clone()
        };
        self.bounded("session save", self.sessions.save(&updated))
            .await?;
        info!(user_id = %record.local_user_id, "oauth2 token refreshed");
        Ok(refreshed)
    }

    async fn send_as(
        &self,
        record: &SessionRecord,
        request: ConversationRequest,
    ) -> Result<(), BridgeError> {
        let token = self.usable_token(record).await?;
        self.bounded(
            "remote agent request",
            self.remote.send(&token.access_token, &request),
        )
        .await
    }

    async fn forward_chat(
        &self,
        user_id: &str,
        cfg: &BridgeConfig,
        message: &ChatMessage,
    ) -> Result<(), BridgeError> {
        if message.text.trim().is_empty() && message.files.is_empty() {
            return Ok(());
        }
        let record = self.require_session(user_id).await?;
        let now = OffsetDateTime::now_utc();
        let timestamp = now.unix_timestamp();

        if message.files.is_empty() {
            let request = ConversationRequest::text(
                new_request_id(),
                &record.remote_user_id,
                message.text.as_str(),
                true,
                timestamp,
            );
            return self.send_as(&record, request).await;
        }

        // One request per file; the first carries the typed text.
        let cipher = TokenCipher::new(&cfg.encryption_secret)?;
        for (index, file) in message.files.iter().enumerate() {
            let reference = FileReference::new(&file.id, cfg.file_reference_ttl, now);
            let sealed = reference.seal(&cipher)?;
            let attachment = MessageAttachment {
                url: cfg.site_path(&format!("file/{sealed}")),
                content_type: file
                    .content_type
                    .clone()
                    .unwrap_or_else(|| BINARY_CONTENT_TYPE.to_string()),
                file_name: file.name.clone(),
            };
            let text = if index == 0 { message.text.as_str() } else { "" };
            let request = ConversationRequest::text(
                new_request_id(),
                &record.remote_user_id,
                text,
                true,
                timestamp,
            )
            .with_attachment(attachment);
            self.send_as(&record, request).await?;
        }
        Ok(())
    }

    /// Posts a value the user picked from a rendered control back to the agent.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn select_option(&self, user_id: &str, value: &str) -> Result<(), BridgeError> {
        let record = self.require_session(user_id).await?;
        let request = ConversationRequest::text(
            new_request_id(),
            &record.remote_user_id,
            value,
            false,
            OffsetDateTime::now_utc().unix_timestamp(),
        );
        self.send_as(&record, request).await
    }

    /// Validates a submitted date/time value and forwards it. Invalid input is answered with an
    /// ephemeral hint when a channel is known, otherwise a direct message.
    #[instrument(skip_all, fields(user_id = %user_id, kind = kind.as_str()))]
    pub async fn submit_date(
        &self,
        user_id: &str,
        kind: DateKind,
        value: &str,
        channel_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let record = self.require_session(user_id).await?;
        let value = match validate_date_input(kind, value) {
            Ok(value) => value,
            Err(hint) => {
                let message = OutboundMessage::text(hint.clone());
                match channel_id {
                    Some(channel_id) => {
                        self.bounded(
                            "ephemeral message",
                            self.sink.ephemeral_message(user_id, channel_id, &message),
                        )
                        .await?
                    }
                    None => self.direct(user_id, message).await?,
                }
                return Err(BridgeError::Validation(hint));
            }
        };
        let request = ConversationRequest::text(
            new_request_id(),
            &record.remote_user_id,
            value,
            false,
            OffsetDateTime::now_utc().unix_timestamp(),
        );
        self.send_as(&record, request).await
    }

    /// Authenticates, decodes and renders a response posted by the remote agent.
    pub async fn handle_webhook(
        &self,
        secret: Option<&str>,
        body: &[u8],
    ) -> Result<BatchReport, BridgeError> {
        self.verify_webhook(secret)?;
        self.deliver_response(body).await
    }

    pub fn verify_webhook(&self, secret: Option<&str>) -> Result<(), BridgeError> {
        let cfg = self.config.snapshot();
        verify_secret(&cfg.webhook_secret, secret.unwrap_or_default())?;
        Ok(())
    }

    /// Decodes and renders a response whose webhook secret was already verified.
    #[instrument(skip_all)]
    pub async fn deliver_response(&self, body: &[u8]) -> Result<BatchReport, BridgeError> {
        let cfg = self.config.snapshot();
        let event = decode_event(body)?;

        let record = match self
            .bounded("session lookup", self.sessions.load_by_remote(&event.user_id))
            .await
        {
            Ok(record) => record,
            Err(BridgeError::Store(StoreError::NotFound)) => {
                return Err(BridgeError::NotLinked(event.user_id));
            }
            Err(err) => return Err(err),
        };

        let ctx = RenderContext::for_site(&cfg.site_url);
        let report = self
            .bounded(
                "response delivery",
                render_batch(self.sink.as_ref(), &record.local_user_id, &event.body, &ctx),
            )
            .await?;
        info!(
            request_id = %event.request_id,
            items = event.body.len(),
            delivered = report.delivered,
            issues = report.issues.len(),
            "remote agent response delivered"
        );
        Ok(report)
    }

    /// Resolves a generated download token to the file bytes and their sniffed content type.
    #[instrument(skip_all)]
    pub async fn open_file(&self, token: &str) -> Result<(Bytes, &'static str), BridgeError> {
        let cfg = self.config.snapshot();
        let cipher = TokenCipher::new(&cfg.encryption_secret)?;
        let reference = FileReference::open(token, &cipher, OffsetDateTime::now_utc())?;
        let bytes = self
            .bounded("file fetch", self.files.fetch(&reference.file_id))
            .await?;
        let content_type = sniff_content_type(&bytes);
        Ok((bytes, content_type))
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn seal_token(cipher: &TokenCipher, token: &OAuthToken) -> Result<String, BridgeError> {
    let payload = serde_json::to_vec(token).map_err(StoreError::from)?;
    Ok(cipher.seal(&payload)?)
}

fn open_token(cipher: &TokenCipher, sealed: &str) -> Result<OAuthToken, BridgeError> {
    let payload = cipher.open(sealed)?;
    Ok(serde_json::from_slice(&payload).map_err(StoreError::from)?)
}

fn is_keyword(text: &str, keyword: &str) -> bool {
    text.trim().eq_ignore_ascii_case(keyword.trim())
}

fn is_affirmative(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "confirm" | "disconnect"
    )
}

fn disconnect_prompt(cfg: &BridgeConfig) -> OutboundMessage {
    let url = cfg.site_path("action/disconnect");
    let button = |id: &str, name: &str, confirmed: bool| Action {
        id: id.into(),
        name: name.into(),
        kind: ActionKind::Button,
        options: Vec::new(),
        integration: Integration {
            url: url.clone(),
            context: json!({ "confirmed": confirmed }),
        },
    };
    OutboundMessage::text(CONFIRM_DISCONNECT_TEXT).with_attachment(Attachment {
        actions: vec![
            button("disconnect_yes", "Yes, disconnect", true),
            button("disconnect_no", "No, stay connected", false),
        ],
        ..Attachment::default()
    })
}

/// Checks a date/time submission against the requested kind. The error is the text to show
/// the user.
pub fn validate_date_input(kind: DateKind, value: &str) -> Result<String, String> {
    let value = value.trim();
    let valid = match kind {
        DateKind::Date => Date::parse(value, DATE_FORMAT).is_ok(),
        DateKind::Time => Time::parse(value, TIME_FORMAT).is_ok(),
        DateKind::DateTime => PrimitiveDateTime::parse(value, DATE_TIME_FORMAT).is_ok(),
    };
    if valid {
        return Ok(value.to_string());
    }
    Err(match kind {
        DateKind::Date => format!(
            "\"{value}\" is not a valid date. Enter it as YYYY-MM-DD, for example 2024-03-31."
        ),
        DateKind::Time => format!(
            "\"{value}\" is not a valid time. Enter it as HH:MM in 24-hour format, for example 14:30."
        ),
        DateKind::DateTime => format!(
            "\"{value}\" is not a valid date and time. Enter it as YYYY-MM-DD HH:MM, for example 2024-03-31 14:30."
        ),
    })
}
