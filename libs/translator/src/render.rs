//! Maps decoded response items onto [`OutboundMessage`]s.
//!
//! Rendering is a pure data transform. Content the chat client cannot show is reported as a
//! [`RenderIssue`] next to whatever could still be rendered; it never fails the call.

use serde_json::json;
use tracing::debug;
use vab_core::{
    CardPayload, DateKind, DefaultDate, GroupedPartsOutputControl, ImageCard, OutputCard,
    OutputImage, OutputLink, OutputText, PickerOption, RecordCard, ResponseItem, UploadKind,
    VideoCard,
};

use crate::message::{
    Action, ActionKind, Attachment, Field, Integration, OutboundMessage, SelectOption,
};

pub const IMAGE_UPLOAD_SUFFIX: &str =
    "To send an image, use the attachment button in your chat client and pick the picture.";
pub const FILE_UPLOAD_SUFFIX: &str =
    "To send a file, use the attachment button in your chat client and pick the file.";
pub const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";
pub const IMAGE_FALLBACK_TEXT: &str = "The image could not be displayed.";

pub const SELECT_ACTION_ID: &str = "option_select";
pub const DATE_ACTION_ID: &str = "date_select";

/// Integration endpoints interactive controls post back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub option_action_url: String,
    pub date_action_url: String,
}

impl RenderContext {
    /// Context whose action URLs live under `site_url`.
    pub fn for_site(site_url: &str) -> Self {
        let base = site_url.trim_end_matches('/');
        Self {
            option_action_url: format!("{base}/action/select"),
            date_action_url: format!("{base}/action/date"),
        }
    }
}

/// Non-fatal condition found while rendering a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderIssue {
    /// A picker arrived without any options; nothing was rendered for it.
    EmptyOptions,
    /// An image URL had no usable path segment; alt text was rendered instead.
    InvalidImageLink { value: String },
}

impl RenderIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderIssue::EmptyOptions => "empty_options",
            RenderIssue::InvalidImageLink { .. } => "invalid_image_link",
        }
    }
}

impl std::fmt::Display for RenderIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderIssue::EmptyOptions => f.write_str("picker has no options"),
            RenderIssue::InvalidImageLink { value } => write!(f, "invalid image link {value:?}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub messages: Vec<OutboundMessage>,
    pub issue: Option<RenderIssue>,
}

impl Rendered {
    fn nothing() -> Self {
        Self::default()
    }

    fn one(message: OutboundMessage) -> Self {
        Self {
            messages: vec![message],
            issue: None,
        }
    }

    fn many(messages: Vec<OutboundMessage>) -> Self {
        Self {
            messages,
            issue: None,
        }
    }

    fn issue(issue: RenderIssue) -> Self {
        Self {
            messages: Vec::new(),
            issue: Some(issue),
        }
    }
}

pub fn render(item: &ResponseItem, ctx: &RenderContext) -> Rendered {
    match item {
        ResponseItem::OutputText(text) => render_text(text),
        ResponseItem::TopicPicker(picker) => {
            let prompt = picker
                .prompt_msg
                .as_deref()
                .or(picker.label.as_deref())
                .unwrap_or_default();
            render_options(item.ui_type(), prompt, &picker.options, ctx)
        }
        ResponseItem::Picker(picker) => render_options(
            item.ui_type(),
            picker.label.as_deref().unwrap_or_default(),
            &picker.options,
            ctx,
        ),
        ResponseItem::OutputLink(link) => Rendered::one(render_link(link)),
        ResponseItem::GroupedParts(parts) => Rendered::many(render_grouped(parts)),
        ResponseItem::OutputCard(card) => render_card(card),
        ResponseItem::OutputImage(image) => render_image(image),
        ResponseItem::DefaultDate(date) => Rendered::one(render_date(date, ctx)),
        ResponseItem::Unhandled { ui_type } => {
            debug!(ui_type = ?ui_type, "skipping unhandled response item");
            Rendered::nothing()
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn render_text(item: &OutputText) -> Rendered {
    let mut text = non_empty(item.label.as_deref())
        .unwrap_or(item.value.as_str())
        .to_string();
    match item.upload_kind() {
        Some(UploadKind::Image) => append_paragraph(&mut text, IMAGE_UPLOAD_SUFFIX),
        Some(UploadKind::File) => append_paragraph(&mut text, FILE_UPLOAD_SUFFIX),
        None => {}
    }
    if text.trim().is_empty() {
        return Rendered::nothing();
    }
    Rendered::one(OutboundMessage::text(text))
}

fn append_paragraph(text: &mut String, paragraph: &str) {
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(paragraph);
}

fn render_options(
    ui_type: &str,
    prompt: &str,
    options: &[PickerOption],
    ctx: &RenderContext,
) -> Rendered {
    if options.is_empty() {
        return Rendered::issue(RenderIssue::EmptyOptions);
    }
    let options = options
        .iter()
        .map(|option| SelectOption {
            text: option.label.clone(),
            value: option.effective_value().to_string(),
        })
        .collect();
    let action = Action {
        id: SELECT_ACTION_ID.into(),
        name: "Select an option".into(),
        kind: ActionKind::Select,
        options,
        integration: Integration {
            url: ctx.option_action_url.clone(),
            context: json!({ "uiType": ui_type }),
        },
    };
    let attachment = Attachment {
        actions: vec![action],
        ..Attachment::default()
    };
    Rendered::one(OutboundMessage::text(prompt).with_attachment(attachment))
}

fn markdown_link(label: &str, target: &str) -> String {
    format!("[{label}]({target})")
}

fn render_link(link: &OutputLink) -> OutboundMessage {
    let anchor = markdown_link(&link.label, &link.value.action);
    match non_empty(link.header.as_deref()) {
        Some(header) => OutboundMessage::text(format!("{header}\n{anchor}")),
        None => OutboundMessage::text(anchor),
    }
}

fn render_grouped(parts: &GroupedPartsOutputControl) -> Vec<OutboundMessage> {
    let header = non_empty(parts.header.as_deref()).map(OutboundMessage::text);
    header
        .into_iter()
        .chain(
            parts
                .values
                .iter()
                .map(|part| OutboundMessage::text(markdown_link(&part.label, &part.action))),
        )
        .collect()
}

fn render_card(card: &OutputCard) -> Rendered {
    match &card.payload {
        CardPayload::SmallImage(image) | CardPayload::LargeImage(image) => {
            Rendered::one(image_card(image))
        }
        CardPayload::Video(video) => Rendered::many(video_card(video)),
        CardPayload::Record(record) => Rendered::one(record_card(record)),
        CardPayload::Unhandled { template_name } => {
            debug!(template_name = ?template_name, "skipping unhandled card template");
            Rendered::nothing()
        }
    }
}

fn image_card(card: &ImageCard) -> OutboundMessage {
    OutboundMessage::default().with_attachment(Attachment {
        title: Some(card.title.clone()),
        text: Some(card.description.clone()),
        image_url: Some(card.image.clone()),
        ..Attachment::default()
    })
}

fn video_card(card: &VideoCard) -> Vec<OutboundMessage> {
    let mut messages = vec![OutboundMessage::default().with_attachment(Attachment {
        title: Some(card.title.clone()),
        title_link: Some(card.link.clone()),
        text: Some(card.description.clone()),
        ..Attachment::default()
    })];
    if let Some(id) = card.youtube_id() {
        messages.push(OutboundMessage::text(format!("{YOUTUBE_WATCH_URL}{id}")));
    }
    messages
}

fn record_card(card: &RecordCard) -> OutboundMessage {
    let header = Field {
        title: card.title.clone(),
        value: card.subtitle.clone(),
        short: false,
    };
    let fields = std::iter::once(header)
        .chain(card.fields.iter().map(|field| Field {
            title: field.field_label.clone(),
            value: field.field_value.clone(),
            short: true,
        }))
        .collect();
    OutboundMessage::default().with_attachment(Attachment {
        title_link: card.url.clone(),
        fields,
        ..Attachment::default()
    })
}

/// Last `/`-separated segment of `value`, ignoring any query or fragment, used as the display
/// file name. Relative paths work the same as absolute URLs.
pub fn image_file_name(value: &str) -> Option<String> {
    let path = value.trim().split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    if last.is_empty() {
        return None;
    }
    Some(last.to_string())
}

fn render_image(image: &OutputImage) -> Rendered {
    match image_file_name(&image.value) {
        Some(name) => Rendered::one(OutboundMessage::default().with_attachment(Attachment {
            title: Some(name),
            image_url: Some(image.value.clone()),
            ..Attachment::default()
        })),
        None => {
            let fallback = non_empty(image.alt_text.as_deref()).unwrap_or(IMAGE_FALLBACK_TEXT);
            Rendered {
                messages: vec![OutboundMessage::text(fallback)],
                issue: Some(RenderIssue::InvalidImageLink {
                    value: image.value.clone(),
                }),
            }
        }
    }
}

fn date_prompt(kind: DateKind) -> (&'static str, &'static str) {
    match kind {
        DateKind::Date => ("Please enter a date.", "Enter date"),
        DateKind::Time => ("Please enter a time.", "Enter time"),
        DateKind::DateTime => ("Please enter a date and time.", "Enter date and time"),
    }
}

fn render_date(date: &DefaultDate, ctx: &RenderContext) -> OutboundMessage {
    let (default_prompt, button) = date_prompt(date.kind);
    let prompt = non_empty(date.label.as_deref()).unwrap_or(default_prompt);
    let action = Action {
        id: DATE_ACTION_ID.into(),
        name: button.into(),
        kind: ActionKind::Button,
        options: Vec::new(),
        integration: Integration {
            url: ctx.date_action_url.clone(),
            context: json!({ "type": date.kind.as_str() }),
        },
    };
    OutboundMessage::text(prompt).with_attachment(Attachment {
        actions: vec![action],
        ..Attachment::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vab_core::{
        GroupedPart, LinkTarget, Picker, PickerKind, RecordField, TopicPickerControl,
    };

    fn ctx() -> RenderContext {
        RenderContext::for_site("https://bridge.example/")
    }

    fn option(label: &str, value: Option<&str>) -> PickerOption {
        PickerOption {
            label: label.into(),
            value: value.map(str::to_string),
            enabled: true,
            description: None,
            attachment: None,
        }
    }

    #[test]
    fn context_urls_hang_off_the_site() {
        let ctx = ctx();
        assert_eq!(ctx.option_action_url, "https://bridge.example/action/select");
        assert_eq!(ctx.date_action_url, "https://bridge.example/action/date");
    }

    #[test]
    fn output_text_prefers_label_and_appends_upload_hint() {
        let item = ResponseItem::OutputText(OutputText {
            value: "raw".into(),
            label: Some("Please upload a screenshot".into()),
            item_type: Some("Picture".into()),
            ..OutputText::default()
        });
        let rendered = render(&item, &ctx());
        assert_eq!(
            rendered.messages[0].text,
            format!("Please upload a screenshot\n\n{IMAGE_UPLOAD_SUFFIX}")
        );

        let file = ResponseItem::OutputText(OutputText {
            value: "Attach the log".into(),
            item_type: Some("file".into()),
            ..OutputText::default()
        });
        let rendered = render(&file, &ctx());
        assert!(rendered.messages[0].text.starts_with("Attach the log"));
        assert!(rendered.messages[0].text.ends_with(FILE_UPLOAD_SUFFIX));
    }

    #[test]
    fn empty_text_renders_nothing() {
        let item = ResponseItem::OutputText(OutputText::default());
        assert_eq!(render(&item, &ctx()), Rendered::default());
    }

    #[test]
    fn empty_picker_reports_issue() {
        let item = ResponseItem::TopicPicker(TopicPickerControl {
            prompt_msg: Some("Pick a topic".into()),
            ..TopicPickerControl::default()
        });
        let rendered = render(&item, &ctx());
        assert!(rendered.messages.is_empty());
        assert_eq!(rendered.issue, Some(RenderIssue::EmptyOptions));
    }

    #[test]
    fn picker_options_default_value_to_label() {
        let item = ResponseItem::Picker(Picker {
            kind: PickerKind::Boolean,
            label: Some("Did that help?".into()),
            options: vec![option("Yes", Some("true")), option("No", None)],
            ..Picker::default()
        });
        let rendered = render(&item, &ctx());
        let message = &rendered.messages[0];
        assert_eq!(message.text, "Did that help?");
        let action = &message.attachments[0].actions[0];
        assert_eq!(action.kind, ActionKind::Select);
        assert_eq!(
            action.options,
            vec![
                SelectOption { text: "Yes".into(), value: "true".into() },
                SelectOption { text: "No".into(), value: "No".into() },
            ]
        );
        assert_eq!(action.integration.context["uiType"], "Boolean");
        assert_eq!(action.integration.url, ctx().option_action_url);
    }

    #[test]
    fn link_combines_header_and_markdown_anchor() {
        let item = ResponseItem::OutputLink(OutputLink {
            label: "Open incident".into(),
            header: Some("Your incident was created".into()),
            value: LinkTarget {
                action: "https://instance.example/inc/1".into(),
            },
            ..OutputLink::default()
        });
        let rendered = render(&item, &ctx());
        assert_eq!(
            rendered.messages[0].text,
            "Your incident was created\n[Open incident](https://instance.example/inc/1)"
        );
    }

    #[test]
    fn grouped_parts_yield_header_then_one_message_per_part() {
        let item = ResponseItem::GroupedParts(GroupedPartsOutputControl {
            header: Some("Related articles".into()),
            values: vec![
                GroupedPart {
                    label: "VPN".into(),
                    action: "https://kb/1".into(),
                    context: None,
                },
                GroupedPart {
                    label: "Email".into(),
                    action: "https://kb/2".into(),
                    context: None,
                },
            ],
            ..GroupedPartsOutputControl::default()
        });
        let texts: Vec<_> = render(&item, &ctx())
            .messages
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(
            texts,
            vec!["Related articles", "[VPN](https://kb/1)", "[Email](https://kb/2)"]
        );
    }

    #[test]
    fn video_card_adds_youtube_follow_up() {
        let item = ResponseItem::OutputCard(OutputCard {
            group: None,
            payload: CardPayload::Video(VideoCard {
                title: "Setup".into(),
                description: "How to".into(),
                link: "https://www.youtube.com/watch?v=abc123".into(),
                video_id: None,
            }),
        });
        let rendered = render(&item, &ctx());
        assert_eq!(rendered.messages.len(), 2);
        assert_eq!(
            rendered.messages[0].attachments[0].title_link.as_deref(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
        assert_eq!(
            rendered.messages[1].text,
            "https://www.youtube.com/watch?v=abc123"
        );
    }

    #[test]
    fn record_card_leads_with_title_field() {
        let item = ResponseItem::OutputCard(OutputCard {
            group: None,
            payload: CardPayload::Record(RecordCard {
                title: "INC0010001".into(),
                subtitle: "Email is down".into(),
                fields: vec![RecordField {
                    field_label: "State".into(),
                    field_value: "New".into(),
                }],
                url: None,
            }),
        });
        let fields = &render(&item, &ctx()).messages[0].attachments[0].fields;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].title, "INC0010001");
        assert_eq!(fields[0].value, "Email is down");
        assert!(!fields[0].short);
        assert_eq!(fields[1].title, "State");
        assert!(fields[1].short);
    }

    #[test]
    fn image_card_carries_image_url() {
        let item = ResponseItem::OutputCard(OutputCard {
            group: None,
            payload: CardPayload::LargeImage(ImageCard {
                title: "Diagram".into(),
                description: "Network".into(),
                image: "https://img.example/net.png".into(),
                image_alt: None,
            }),
        });
        let attachment = &render(&item, &ctx()).messages[0].attachments[0];
        assert_eq!(attachment.image_url.as_deref(), Some("https://img.example/net.png"));
        assert_eq!(attachment.title.as_deref(), Some("Diagram"));
    }

    #[test]
    fn output_image_uses_last_segment_as_file_name() {
        let item = ResponseItem::OutputImage(OutputImage {
            value: "https://img.example/a/b/photo.jpg".into(),
            ..OutputImage::default()
        });
        let rendered = render(&item, &ctx());
        assert!(rendered.issue.is_none());
        assert_eq!(
            rendered.messages[0].attachments[0].title.as_deref(),
            Some("photo.jpg")
        );
    }

    #[test]
    fn output_image_accepts_relative_paths() {
        for (value, name) in [
            ("images/photo.png", "photo.png"),
            ("/static/img/logo.svg?v=3#top", "logo.svg"),
            ("banner.gif", "banner.gif"),
        ] {
            let item = ResponseItem::OutputImage(OutputImage {
                value: value.into(),
                ..OutputImage::default()
            });
            let rendered = render(&item, &ctx());
            assert!(rendered.issue.is_none(), "{value}");
            let attachment = &rendered.messages[0].attachments[0];
            assert_eq!(attachment.title.as_deref(), Some(name));
            assert_eq!(attachment.image_url.as_deref(), Some(value));
        }
    }

    #[test]
    fn output_image_without_path_falls_back_to_alt_text() {
        for value in ["https://img.example/", "images/?size=2", "  ", ""] {
            let item = ResponseItem::OutputImage(OutputImage {
                value: value.into(),
                alt_text: Some("A router".into()),
                ..OutputImage::default()
            });
            let rendered = render(&item, &ctx());
            assert_eq!(rendered.messages[0].text, "A router", "{value}");
            assert_eq!(
                rendered.issue,
                Some(RenderIssue::InvalidImageLink { value: value.into() })
            );
        }
    }

    #[test]
    fn date_button_records_requested_kind() {
        let item = ResponseItem::DefaultDate(DefaultDate {
            kind: DateKind::DateTime,
            label: None,
            ..DefaultDate::default()
        });
        let message = &render(&item, &ctx()).messages[0];
        assert_eq!(message.text, "Please enter a date and time.");
        let action = &message.attachments[0].actions[0];
        assert_eq!(action.kind, ActionKind::Button);
        assert_eq!(action.integration.context["type"], "DateTime");
    }

    #[test]
    fn unhandled_items_render_nothing_without_issue() {
        let item = ResponseItem::Unhandled {
            ui_type: Some("mockUIType".into()),
        };
        assert_eq!(render(&item, &ctx()), Rendered::default());
        let card = ResponseItem::OutputCard(OutputCard {
            group: None,
            payload: CardPayload::Unhandled {
                template_name: Some("Carousel".into()),
            },
        });
        assert_eq!(render(&card, &ctx()), Rendered::default());
    }
}
