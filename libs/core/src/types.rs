use serde::{Deserialize, Deserializer, Serialize};

/// Discriminator values carried in the `uiType` field of a response item.
pub mod ui_type {
    pub const OUTPUT_TEXT: &str = "OutputText";
    pub const TOPIC_PICKER: &str = "TopicPickerControl";
    pub const PICKER: &str = "Picker";
    pub const BOOLEAN: &str = "Boolean";
    pub const OUTPUT_LINK: &str = "OutputLink";
    pub const GROUPED_PARTS: &str = "GroupedPartsOutputControl";
    pub const OUTPUT_CARD: &str = "OutputCard";
    pub const OUTPUT_IMAGE: &str = "OutputImage";
    pub const DATE: &str = "Date";
    pub const TIME: &str = "Time";
    pub const DATE_TIME: &str = "DateTime";
}

/// Discriminator values carried in the `templateName` field of an `OutputCard`.
pub mod card_template {
    pub const SMALL_IMAGE: &str = "SmallImageCard";
    pub const LARGE_IMAGE: &str = "LargeImageCard";
    pub const VIDEO: &str = "VideoCard";
    pub const RECORD: &str = "Card";
}

/// Reads an explicit JSON `null` as the field's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope-level action understood by the remote agent.
///
/// Anything other than `START_CONVERSATION` is treated as no action.
///
/// ```
/// use vab_core::ConversationAction;
///
/// let action: ConversationAction = serde_json::from_str("\"mockAction\"").unwrap();
/// assert!(action.is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationAction {
    #[serde(rename = "START_CONVERSATION")]
    StartConversation,
    #[default]
    #[serde(other)]
    None,
}

impl ConversationAction {
    pub fn is_none(&self) -> bool {
        matches!(self, ConversationAction::None)
    }
}

/// File the chat user attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttachment {
    pub url: String,
    pub content_type: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundText {
    pub text: String,
    pub typed: bool,
    pub client_message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<MessageAttachment>,
}

/// Request envelope posted to the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "ConversationAction::is_none")]
    pub action: ConversationAction,
    pub user_id: String,
    pub client_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<OutboundText>,
    pub timestamp: i64,
    pub timezone: String,
}

impl ConversationRequest {
    fn base(request_id: String, user_id: &str, timestamp: i64) -> Self {
        Self {
            client_session_id: user_id.to_string(),
            request_id,
            action: ConversationAction::None,
            user_id: user_id.to_string(),
            now_session_id: None,
            message: None,
            timestamp,
            timezone: "UTC".into(),
        }
    }

    /// Builds the request that opens a conversation for a freshly linked user.
    pub fn start(request_id: String, user_id: &str, timestamp: i64) -> Self {
        Self {
            action: ConversationAction::StartConversation,
            ..Self::base(request_id, user_id, timestamp)
        }
    }

    /// Builds a request carrying a chat message. `typed` is false for values picked from a
    /// rendered control rather than typed by the user.
    pub fn text(
        request_id: String,
        user_id: &str,
        text: impl Into<String>,
        typed: bool,
        timestamp: i64,
    ) -> Self {
        let message = OutboundText {
            text: text.into(),
            typed,
            client_message_id: request_id.clone(),
            attachment: None,
        };
        Self {
            message: Some(message),
            ..Self::base(request_id, user_id, timestamp)
        }
    }

    pub fn with_attachment(mut self, attachment: MessageAttachment) -> Self {
        if let Some(message) = self.message.as_mut() {
            message.attachment = Some(attachment);
        }
        self
    }
}

/// Decoded response envelope received from the remote agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEvent {
    pub request_id: String,
    pub action: ConversationAction,
    pub user_id: String,
    pub client_session_id: Option<String>,
    pub now_session_id: Option<String>,
    pub completed: bool,
    pub body: Vec<ResponseItem>,
}

/// One entry of a response body, classified by its `uiType` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseItem {
    OutputText(OutputText),
    TopicPicker(TopicPickerControl),
    Picker(Picker),
    OutputLink(OutputLink),
    GroupedParts(GroupedPartsOutputControl),
    OutputCard(OutputCard),
    OutputImage(OutputImage),
    DefaultDate(DefaultDate),
    /// Unrecognised or missing discriminator. Carries no payload and renders nothing.
    Unhandled { ui_type: Option<String> },
}

impl ResponseItem {
    pub fn ui_type(&self) -> &str {
        match self {
            ResponseItem::OutputText(_) => ui_type::OUTPUT_TEXT,
            ResponseItem::TopicPicker(_) => ui_type::TOPIC_PICKER,
            ResponseItem::Picker(picker) => picker.kind.as_str(),
            ResponseItem::OutputLink(_) => ui_type::OUTPUT_LINK,
            ResponseItem::GroupedParts(_) => ui_type::GROUPED_PARTS,
            ResponseItem::OutputCard(_) => ui_type::OUTPUT_CARD,
            ResponseItem::OutputImage(_) => ui_type::OUTPUT_IMAGE,
            ResponseItem::DefaultDate(date) => date.kind.as_str(),
            ResponseItem::Unhandled { ui_type } => ui_type.as_deref().unwrap_or_default(),
        }
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, ResponseItem::Unhandled { .. })
    }
}

/// Kind of upload an `OutputText` prompt asks the user for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputText {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub mask_type: Option<String>,
}

impl OutputText {
    pub fn upload_kind(&self) -> Option<UploadKind> {
        let item_type = self.item_type.as_deref()?.trim();
        if item_type.eq_ignore_ascii_case("picture") || item_type.eq_ignore_ascii_case("image") {
            Some(UploadKind::Image)
        } else if item_type.eq_ignore_ascii_case("file") {
            Some(UploadKind::File)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerOption {
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "enabled_by_default", deserialize_with = "null_as_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

fn null_as_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_else(enabled_by_default))
}

impl PickerOption {
    /// Value posted back when the option is chosen; the label stands in when no value is set.
    pub fn effective_value(&self) -> &str {
        match self.value.as_deref() {
            Some(value) if !value.is_empty() => value,
            _ => &self.label,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPickerControl {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub prompt_msg: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nlu_text_enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<PickerOption>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PickerKind {
    #[default]
    Picker,
    Boolean,
}

impl PickerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickerKind::Picker => ui_type::PICKER,
            PickerKind::Boolean => ui_type::BOOLEAN,
        }
    }
}

/// Shape shared by the `Picker` and `Boolean` controls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Picker {
    #[serde(skip)]
    pub kind: PickerKind,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_select: bool,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<PickerOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLink {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: LinkTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedPart {
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedPartsOutputControl {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<GroupedPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCard {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, alias = "imageUrl", deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default)]
    pub image_alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCard {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, alias = "videoLink", deserialize_with = "null_as_default")]
    pub link: String,
    #[serde(default)]
    pub video_id: Option<String>,
}

impl VideoCard {
    /// YouTube id of the video: the explicit `videoId`, else the id carried by the link.
    pub fn youtube_id(&self) -> Option<String> {
        let explicit = self.video_id.as_deref().map(str::trim).unwrap_or_default();
        if !explicit.is_empty() {
            return Some(explicit.to_string());
        }
        let parsed = url::Url::parse(self.link.trim()).ok()?;
        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            return Some(id.into_owned()).filter(|id| !id.is_empty());
        }
        parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordField {
    #[serde(default, deserialize_with = "null_as_default")]
    pub field_label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub field_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCard {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<RecordField>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Payload embedded in an `OutputCard`, selected by its `templateName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardPayload {
    SmallImage(ImageCard),
    LargeImage(ImageCard),
    Video(VideoCard),
    Record(RecordCard),
    Unhandled { template_name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCard {
    pub group: Option<String>,
    pub payload: CardPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputImage {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateKind {
    #[default]
    Date,
    Time,
    DateTime,
}

impl DateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateKind::Date => ui_type::DATE,
            DateKind::Time => ui_type::TIME,
            DateKind::DateTime => ui_type::DATE_TIME,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ui_type::DATE => Some(DateKind::Date),
            ui_type::TIME => Some(DateKind::Time),
            ui_type::DATE_TIME => Some(DateKind::DateTime),
            _ => None,
        }
    }
}

/// Uniform shape of the `Date`, `Time` and `DateTime` controls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultDate {
    #[serde(skip)]
    pub kind: DateKind,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
}
