use time::OffsetDateTime;
use vab_bridge::bridge::{ALREADY_CONNECTED_TEXT, CONFIRM_DISCONNECT_TEXT, CONNECTED_TEXT};
use vab_bridge::testkit::{MockOAuthClient, TestBridge, test_config};
use vab_bridge::{BridgeError, BridgeState, ChatFile, ChatMessage, OAuthError, OAuthToken};
use vab_core::ConversationAction;

fn expired_token(refresh_token: Option<&str>) -> OAuthToken {
    OAuthToken {
        access_token: "access-old".into(),
        refresh_token: refresh_token.map(str::to_string),
        token_type: Some("Bearer".into()),
        expires_at: Some(OffsetDateTime::now_utc().unix_timestamp() - 10),
    }
}

#[tokio::test]
async fn unlinked_user_is_offered_a_connect_link() {
    let harness = TestBridge::new();
    let state = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("hello"))
        .await
        .unwrap();
    assert_eq!(state, BridgeState::Unlinked);
    let texts = harness.sink.texts_for("user1").await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("https://bridge.example/oauth2/connect"));
    assert!(harness.remote.sent.lock().await.is_empty());
}

#[tokio::test]
async fn linking_greets_the_user_and_starts_a_conversation() {
    let harness = TestBridge::new();
    let remote_id = harness.link("user1").await;
    assert_eq!(remote_id, "remote-1");

    assert_eq!(harness.sink.texts_for("user1").await, vec![CONNECTED_TEXT]);
    let sent = harness.remote.sent.lock().await;
    assert_eq!(sent.len(), 1);
    let (token, request) = &sent[0];
    assert_eq!(token, "access-1");
    assert_eq!(request.action, ConversationAction::StartConversation);
    assert_eq!(request.user_id, "remote-1");

    let record = harness.bridge.sessions().load_by_remote("remote-1").await.unwrap();
    assert_eq!(record.local_user_id, "user1");
    assert_eq!(record.remote_username.as_deref(), Some("abel.tuter"));
    assert!(!record.encrypted_token.contains("access-1"));
}

#[tokio::test]
async fn linked_user_cannot_connect_twice() {
    let harness = TestBridge::new();
    harness.link("user1").await;
    let err = harness.bridge.begin_connect("user1").await.unwrap_err();
    assert!(matches!(err, BridgeError::Validation(ref text) if text == ALREADY_CONNECTED_TEXT));
}

#[tokio::test]
async fn second_pending_link_cannot_replace_the_session() {
    let harness = TestBridge::new();
    let state_of = |url: String| url.split("state=").nth(1).unwrap().to_string();
    let first = state_of(harness.bridge.begin_connect("user1").await.unwrap());
    let second = state_of(harness.bridge.begin_connect("user1").await.unwrap());

    harness
        .bridge
        .complete_connect("user1", "code-1", &first)
        .await
        .unwrap();
    let err = harness
        .bridge
        .complete_connect("user1", "code-2", &second)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation(ref text) if text == ALREADY_CONNECTED_TEXT));
    assert_eq!(*harness.oauth.exchanged.lock().await, vec!["code-1".to_string()]);

    let record = harness.bridge.sessions().load_by_local("user1").await.unwrap();
    assert_eq!(record.remote_user_id, "remote-1");
    let by_remote = harness.bridge.sessions().load_by_remote("remote-1").await.unwrap();
    assert_eq!(by_remote.local_user_id, "user1");
}

#[tokio::test]
async fn typed_messages_are_forwarded_as_the_linked_user() {
    let harness = TestBridge::new();
    harness.link("user1").await;

    let state = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("reset my password"))
        .await
        .unwrap();
    assert_eq!(state, BridgeState::Linked);

    let sent = harness.remote.sent.lock().await;
    let (_, request) = sent.last().unwrap();
    let message = request.message.as_ref().unwrap();
    assert_eq!(message.text, "reset my password");
    assert!(message.typed);
    assert_eq!(request.action, ConversationAction::None);
}

#[tokio::test]
async fn typed_answer_resolves_a_pending_disconnect() {
    let harness = TestBridge::new();
    harness.link("user1").await;

    let state = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("disconnect"))
        .await
        .unwrap();
    assert_eq!(state, BridgeState::DisconnectConfirming);
    assert!(
        harness
            .sink
            .texts_for("user1")
            .await
            .contains(&CONFIRM_DISCONNECT_TEXT.to_string())
    );

    let state = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("nope"))
        .await
        .unwrap();
    assert_eq!(state, BridgeState::Linked);

    harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("disconnect"))
        .await
        .unwrap();
    let state = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text(" YES "))
        .await
        .unwrap();
    assert_eq!(state, BridgeState::Unlinked);
}

#[tokio::test]
async fn attached_files_become_download_links() {
    let harness = TestBridge::new();
    harness.link("user1").await;
    harness.files.insert("f1", b"first".to_vec());
    harness.files.insert("f2", vec![0u8, 159, 146, 150]);

    let message = ChatMessage {
        text: "see attached".into(),
        files: vec![
            ChatFile {
                id: "f1".into(),
                name: "first.txt".into(),
                content_type: Some("text/plain".into()),
            },
            ChatFile {
                id: "f2".into(),
                name: "blob.bin".into(),
                content_type: None,
            },
        ],
    };
    harness
        .bridge
        .handle_chat_message("user1", &message)
        .await
        .unwrap();

    let sent = harness.remote.sent.lock().await;
    let forwarded: Vec<_> = sent[1..]
        .iter()
        .map(|(_, request)| request.message.clone().unwrap())
        .collect();
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0].text, "see attached");
    assert_eq!(forwarded[1].text, "");

    let first = forwarded[0].attachment.as_ref().unwrap();
    assert_eq!(first.file_name, "first.txt");
    assert_eq!(first.content_type, "text/plain");
    let second = forwarded[1].attachment.as_ref().unwrap();
    assert_eq!(second.content_type, "application/octet-stream");

    let token = first
        .url
        .strip_prefix("https://bridge.example/file/")
        .unwrap();
    let (bytes, content_type) = harness.bridge.open_file(token).await.unwrap();
    assert_eq!(&bytes[..], b"first");
    assert_eq!(content_type, "text/plain; charset=utf-8");

    let token = second
        .url
        .strip_prefix("https://bridge.example/file/")
        .unwrap();
    let (_, content_type) = harness.bridge.open_file(token).await.unwrap();
    assert_eq!(content_type, "application/octet-stream");
}

#[tokio::test]
async fn expiring_token_is_refreshed_and_saved() {
    let harness = TestBridge::with(
        test_config(),
        MockOAuthClient::new(expired_token(Some("refresh-old"))),
    );
    harness.link("user1").await;

    assert_eq!(*harness.oauth.refreshed.lock().await, vec!["refresh-old"]);
    assert_eq!(
        harness.remote.sent.lock().await[0].0,
        "access-old-refreshed"
    );

    harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("again"))
        .await
        .unwrap();
    // The refreshed token does not expire, so no second refresh happens.
    assert_eq!(harness.oauth.refreshed.lock().await.len(), 1);
    assert_eq!(
        harness.remote.sent.lock().await[1].0,
        "access-old-refreshed"
    );
}

#[tokio::test]
async fn expired_token_without_refresh_token_asks_to_reconnect() {
    let harness = TestBridge::with(test_config(), MockOAuthClient::new(expired_token(None)));
    harness.link("user1").await;
    assert!(harness.remote.sent.lock().await.is_empty());

    let err = harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::OAuth(OAuthError::NotRefreshable)));
    let texts = harness.sink.texts_for("user1").await;
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Your connection has expired. Disconnect and connect your account again.")
    );
}

#[tokio::test]
async fn config_replacement_is_seen_by_later_requests() {
    let harness = TestBridge::new();
    let mut next = test_config();
    next.site_url = "https://moved.example".into();
    harness.config.replace(next);

    harness
        .bridge
        .handle_chat_message("user1", &ChatMessage::text("hello"))
        .await
        .unwrap();
    let texts = harness.sink.texts_for("user1").await;
    assert!(texts[0].contains("https://moved.example/oauth2/connect"));
}
