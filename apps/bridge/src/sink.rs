use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use vab_translator::{DeliveryError, MessageSink, OutboundMessage};

/// Delivers messages through the chat platform's bot API.
///
/// Direct messages are posted to `{api_base}/direct`, ephemeral ones to `{api_base}/ephemeral`,
/// both authenticated with the bot token.
pub struct HttpMessageSink {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Serialize)]
struct DirectPost<'a> {
    user_id: &'a str,
    message: &'a OutboundMessage,
}

#[derive(Serialize)]
struct EphemeralPost<'a> {
    user_id: &'a str,
    channel_id: &'a str,
    message: &'a OutboundMessage,
}

impl HttpMessageSink {
    pub fn new(client: Client, api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        user_id: &str,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DeliveryError::UnknownRecipient(user_id.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessageSink for HttpMessageSink {
    async fn direct_message(
        &self,
        user_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.post("direct", user_id, &DirectPost { user_id, message })
            .await
    }

    async fn ephemeral_message(
        &self,
        user_id: &str,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.post(
            "ephemeral",
            user_id,
            &EphemeralPost {
                user_id,
                channel_id,
                message,
            },
        )
        .await
    }
}
