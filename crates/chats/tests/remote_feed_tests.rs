//! Remote events flowing through the loopback feed

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use parley_chats::{
    ChatSession, ChatSettings, CreateConversationRequest, EventKind, LoopbackTransport,
    MessageStatus, RemoteEvent, RemoteMessage, SendMessageRequest, TypingEvent,
};
use parley_users::{PresenceStatus, User};

fn session() -> ChatSession<LoopbackTransport> {
    let session = ChatSession::new(Arc::new(LoopbackTransport::default()), ChatSettings::default());
    session.set_current_user(User::new("alice", "Alice")).unwrap();
    session.register_user(User::new("bob", "Bob")).unwrap();
    session
}

#[tokio::test]
async fn test_feed_applies_events_and_skips_bad_ones() {
    let session = session();
    let conversation = session
        .create_conversation(CreateConversationRequest::new(["alice", "bob"]))
        .unwrap();
    let sent = session
        .send_message(SendMessageRequest::text(&conversation.id, "alice", "ping"))
        .await
        .unwrap();
    session.wait_idle().await;

    let events = vec![
        RemoteEvent::Message(RemoteMessage::text(&conversation.id, "bob", "pong").with_external_id("x1")),
        RemoteEvent::Message(RemoteMessage::text(&conversation.id, "bob", "pong").with_external_id("x1")),
        RemoteEvent::Message(RemoteMessage::text("unknown", "bob", "lost")),
        RemoteEvent::Receipt {
            conversation_id: conversation.id.clone(),
            message_id: sent.id.clone(),
            status: MessageStatus::Seen,
        },
        RemoteEvent::Presence {
            user_id: "bob".to_string(),
            presence: PresenceStatus::Available,
        },
    ];

    let applied = session.run_remote_feed(stream::iter(events)).await;
    assert_eq!(applied, 4);

    let stored = session.store().get(&conversation.id).unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].status, MessageStatus::Seen);
    assert_eq!(stored.messages[1].external_id.as_deref(), Some("x1"));
    assert!(session.get_user("bob").unwrap().is_online());
}

#[tokio::test(start_paused = true)]
async fn test_remote_typing_is_not_throttled() {
    let session = session();
    let conversation = session
        .create_conversation(CreateConversationRequest::new(["alice", "bob"]))
        .unwrap();
    let mut events = session.events();

    for _ in 0..2 {
        session
            .handle_remote(RemoteEvent::Typing(TypingEvent::new(&conversation.id, "bob", true)))
            .await
            .unwrap();
    }

    let mut typing = 0;
    while let Ok(event) = events.try_recv() {
        if event.kind() == EventKind::TypingChanged {
            typing += 1;
        }
    }
    assert_eq!(typing, 2);
    // remote typing never echoes back out
    assert!(session.transport().typing_signals().is_empty());
}

#[tokio::test]
async fn test_injected_events_reach_the_session() {
    let session = Arc::new(session());
    let conversation = session
        .create_conversation(CreateConversationRequest::new(["alice", "bob"]))
        .unwrap();

    let feed = session.transport().remote_feed().unwrap();
    let pump = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run_remote_feed(feed).await })
    };

    let mut events = session.events();
    assert!(session
        .transport()
        .inject(RemoteEvent::Message(RemoteMessage::text(&conversation.id, "bob", "hello"))));

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind(), EventKind::MessageAdded);
    assert_eq!(session.store().get(&conversation.id).unwrap().unread_count, 1);

    pump.abort();
}
