use async_trait::async_trait;
use thiserror::Error;
use tracing::{instrument, warn};
use vab_core::ResponseItem;
use vab_telemetry::{record_delivery_failure, record_render_issue};

use crate::message::OutboundMessage;
use crate::render::{RenderContext, RenderIssue, render};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chat platform unreachable: {0}")]
    Transport(String),
    #[error("chat platform rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("recipient {0} is unknown to the chat platform")]
    UnknownRecipient(String),
}

impl DeliveryError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Transport(_) => "transport",
            DeliveryError::Rejected { .. } => "rejected",
            DeliveryError::UnknownRecipient(_) => "unknown_recipient",
        }
    }
}

/// Message-posting capability of the chat platform.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Posts into the user's direct conversation with the bot.
    async fn direct_message(
        &self,
        user_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError>;

    /// Posts a message only `user_id` can see in `channel_id`.
    async fn ephemeral_message(
        &self,
        user_id: &str,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError>;
}

/// Render issue tied to the position of its item in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIssue {
    pub index: usize,
    pub ui_type: String,
    pub issue: RenderIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub issues: Vec<ItemIssue>,
}

/// Renders every item and delivers the result to `user_id` in order.
///
/// Content problems are collected in the report and do not stop the batch. The first delivery
/// failure aborts the remaining items and is returned.
#[instrument(skip_all, fields(user_id = %user_id, items = items.len()))]
pub async fn render_batch(
    sink: &dyn MessageSink,
    user_id: &str,
    items: &[ResponseItem],
    ctx: &RenderContext,
) -> Result<BatchReport, DeliveryError> {
    let mut report = BatchReport::default();
    for (index, item) in items.iter().enumerate() {
        let rendered = render(item, ctx);
        if let Some(issue) = rendered.issue {
            warn!(index, ui_type = item.ui_type(), %issue, "response item rendered with issue");
            record_render_issue(item.ui_type(), issue.as_str());
            report.issues.push(ItemIssue {
                index,
                ui_type: item.ui_type().to_string(),
                issue,
            });
        }
        for message in &rendered.messages {
            if let Err(err) = sink.direct_message(user_id, message).await {
                warn!(index, error = %err, "delivery failed; abandoning remaining items");
                record_delivery_failure(err.kind());
                return Err(err);
            }
            report.delivered += 1;
        }
    }
    Ok(report)
}
