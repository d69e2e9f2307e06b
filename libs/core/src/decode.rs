//! Decoder for response envelopes posted by the remote agent.
//!
//! The envelope itself must be well formed. Body items are classified one at a time by their
//! `uiType` discriminator; an item that cannot be classified becomes
//! [`ResponseItem::Unhandled`] instead of failing the whole response.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{
    CardPayload, ConversationAction, ConversationEvent, DateKind, DefaultDate, ImageCard,
    OutputCard, Picker, PickerKind, RecordCard, ResponseItem, VideoCard, card_template,
    null_as_default, ui_type,
};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed conversation envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    request_id: String,
    #[serde(default)]
    action: Option<ConversationAction>,
    #[serde(default, deserialize_with = "null_as_default")]
    user_id: String,
    #[serde(default)]
    client_session_id: Option<String>,
    #[serde(default)]
    now_session_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    completed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    body: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    template_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    data: String,
}

/// Decodes a raw webhook body into a [`ConversationEvent`].
///
/// ```
/// use vab_core::{decode_event, ResponseItem};
///
/// let raw = br#"{"requestId":"r1","userId":"u1","body":[
///     {"uiType":"OutputText","value":"Hi there"},
///     {"uiType":"Mystery"}
/// ]}"#;
/// let event = decode_event(raw).unwrap();
/// assert_eq!(event.body.len(), 2);
/// assert!(matches!(event.body[0], ResponseItem::OutputText(_)));
/// assert!(event.body[1].is_unhandled());
/// ```
pub fn decode_event(raw: &[u8]) -> Result<ConversationEvent, DecodeError> {
    let envelope: RawEnvelope = serde_json::from_slice(raw)?;
    let body = envelope.body.into_iter().map(decode_item).collect();
    Ok(ConversationEvent {
        request_id: envelope.request_id,
        action: envelope.action.unwrap_or_default(),
        user_id: envelope.user_id,
        client_session_id: envelope.client_session_id,
        now_session_id: envelope.now_session_id,
        completed: envelope.completed,
        body,
    })
}

/// Classifies a single body item by its `uiType` discriminator.
pub fn decode_item(value: Value) -> ResponseItem {
    let tag = value
        .get("uiType")
        .and_then(Value::as_str)
        .map(str::to_string);
    let Some(tag) = tag else {
        debug!("response item without uiType skipped");
        return ResponseItem::Unhandled { ui_type: None };
    };

    let decoded = match tag.as_str() {
        ui_type::OUTPUT_TEXT => variant(value, &tag).map(ResponseItem::OutputText),
        ui_type::TOPIC_PICKER => variant(value, &tag).map(ResponseItem::TopicPicker),
        ui_type::PICKER | ui_type::BOOLEAN => {
            variant::<Picker>(value, &tag).map(|mut picker| {
                picker.kind = if tag == ui_type::BOOLEAN {
                    PickerKind::Boolean
                } else {
                    PickerKind::Picker
                };
                ResponseItem::Picker(picker)
            })
        }
        ui_type::OUTPUT_LINK => variant(value, &tag).map(ResponseItem::OutputLink),
        ui_type::GROUPED_PARTS => variant(value, &tag).map(ResponseItem::GroupedParts),
        ui_type::OUTPUT_CARD => {
            variant::<RawCard>(value, &tag).map(|card| ResponseItem::OutputCard(decode_card(card)))
        }
        ui_type::OUTPUT_IMAGE => variant(value, &tag).map(ResponseItem::OutputImage),
        ui_type::DATE | ui_type::TIME | ui_type::DATE_TIME => {
            variant::<DefaultDate>(value, &tag).map(|mut date| {
                date.kind = DateKind::parse(&tag).unwrap_or_default();
                ResponseItem::DefaultDate(date)
            })
        }
        _ => {
            debug!(ui_type = %tag, "unrecognised response item skipped");
            None
        }
    };

    decoded.unwrap_or(ResponseItem::Unhandled { ui_type: Some(tag) })
}

fn variant<T: DeserializeOwned>(value: Value, tag: &str) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(err) => {
            warn!(ui_type = %tag, error = %err, "response item does not match its uiType");
            None
        }
    }
}

fn decode_card(raw: RawCard) -> OutputCard {
    let template = raw.template_name.as_deref().unwrap_or_default();
    let payload = match template {
        card_template::SMALL_IMAGE => card_data::<ImageCard>(&raw.data, template)
            .map(CardPayload::SmallImage),
        card_template::LARGE_IMAGE => card_data::<ImageCard>(&raw.data, template)
            .map(CardPayload::LargeImage),
        card_template::VIDEO => card_data::<VideoCard>(&raw.data, template).map(CardPayload::Video),
        card_template::RECORD => {
            card_data::<RecordCard>(&raw.data, template).map(CardPayload::Record)
        }
        _ => None,
    };
    OutputCard {
        group: raw.group,
        payload: payload.unwrap_or(CardPayload::Unhandled {
            template_name: raw.template_name,
        }),
    }
}

fn card_data<T: DeserializeOwned>(data: &str, template: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(card) => Some(card),
        Err(err) => {
            warn!(template, error = %err, "card data does not match its templateName");
            None
        }
    }
}
