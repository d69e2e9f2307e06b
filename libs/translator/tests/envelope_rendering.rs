use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use vab_core::decode_event;
use vab_translator::{
    ActionKind, DeliveryError, MessageSink, OutboundMessage, RenderContext, RenderIssue,
    YOUTUBE_WATCH_URL, render_batch,
};

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl MessageSink for CollectingSink {
    async fn direct_message(
        &self,
        _user_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn ephemeral_message(
        &self,
        _user_id: &str,
        _channel_id: &str,
        _message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        unreachable!("batches only post direct messages")
    }
}

#[tokio::test]
async fn mixed_envelope_renders_in_order_and_reports_issues() {
    let video = json!({
        "title": "Reset your password",
        "description": "A short walkthrough",
        "link": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
    });
    let raw = json!({
        "requestId": "r-1",
        "userId": "remote-1",
        "body": [
            { "uiType": "OutputText", "value": "Here is what I found" },
            { "uiType": "TopicPickerControl", "promptMsg": "Pick a topic", "options": [] },
            {
                "uiType": "Picker",
                "label": "Which laptop?",
                "options": [
                    { "label": "Mac", "value": "mac" },
                    { "label": "Windows" }
                ]
            },
            { "uiType": "OutputCard", "templateName": "VideoCard", "data": video.to_string() },
            { "uiType": "OutputImage", "value": "https://img.example/", "altText": "diagram" },
            { "uiType": "SomethingNew" },
            { "uiType": "Date", "label": "When did it start?" }
        ]
    })
    .to_string();

    let event = decode_event(raw.as_bytes()).unwrap();
    let sink = CollectingSink::default();
    let ctx = RenderContext::for_site("https://bridge.example/");
    let report = render_batch(&sink, "local-1", &event.body, &ctx)
        .await
        .unwrap();

    let messages = sink.messages.lock().unwrap();
    assert_eq!(report.delivered, messages.len());
    assert_eq!(messages.len(), 6);

    assert_eq!(messages[0].text, "Here is what I found");

    let select = &messages[1].attachments[0].actions[0];
    assert_eq!(select.kind, ActionKind::Select);
    assert_eq!(select.integration.url, "https://bridge.example/action/select");
    let values: Vec<_> = select.options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, ["mac", "Windows"]);

    assert_eq!(
        messages[2].attachments[0].title.as_deref(),
        Some("Reset your password")
    );
    assert_eq!(messages[3].text, format!("{YOUTUBE_WATCH_URL}dQw4w9WgXcQ"));
    assert_eq!(messages[4].text, "diagram");

    let date = &messages[5].attachments[0].actions[0];
    assert_eq!(messages[5].text, "When did it start?");
    assert_eq!(date.integration.context, json!({ "type": "Date" }));

    let issues: Vec<_> = report.issues.iter().map(|i| (i.index, &i.issue)).collect();
    assert_eq!(
        issues,
        [
            (1, &RenderIssue::EmptyOptions),
            (
                4,
                &RenderIssue::InvalidImageLink {
                    value: "https://img.example/".into()
                }
            ),
        ]
    );
}

struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn direct_message(
        &self,
        user_id: &str,
        _message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::UnknownRecipient(user_id.to_string()))
    }

    async fn ephemeral_message(
        &self,
        user_id: &str,
        _channel_id: &str,
        _message: &OutboundMessage,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::UnknownRecipient(user_id.to_string()))
    }
}

#[tokio::test]
async fn delivery_failure_stops_the_batch() {
    let raw = br#"{"requestId":"r","userId":"u","body":[
        {"uiType":"OutputText","value":"one"},
        {"uiType":"OutputText","value":"two"}
    ]}"#;
    let event = decode_event(raw).unwrap();
    let err = render_batch(
        &FailingSink,
        "local-1",
        &event.body,
        &RenderContext::for_site("https://bridge.example"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DeliveryError::UnknownRecipient(ref user) if user == "local-1"));
}
