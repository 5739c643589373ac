use tandem_core::{ControlMessage, Frame, SignalMessage};
use tandem_peer::{PeerEvent, SessionCommand};

use super::{SessionHarness, eventually, settle};

fn text_bodies(messages: &[ControlMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ControlMessage::Text { body, .. } => Some(body.clone()),
            _ => None,
        })
        .collect()
}

fn frame(message: ControlMessage) -> Frame {
    message.into_frame().unwrap()
}

async fn send_texts(h: &mut SessionHarness, bodies: &[&str]) -> Vec<u64> {
    let mut timestamps = Vec::new();
    for body in bodies {
        h.session.command(SessionCommand::SendText(body.to_string())).unwrap();
        let Some(PeerEvent::MessageSent { timestamp, .. }) =
            h.next_event(|e| matches!(e, PeerEvent::MessageSent { .. })).await
        else {
            panic!("expected MessageSent for {}", body);
        };
        timestamps.push(timestamp);
    }
    timestamps
}

#[tokio::test]
async fn test_messages_sent_before_open_are_flushed_in_order() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.control_channel();

    send_texts(&mut h, &["one", "two", "three", "four", "five"]).await;
    assert!(control.frames().is_empty(), "nothing may be written before the channel opens");

    transport.open(&control);

    assert!(eventually(|| control.frames().len() == 5).await);
    assert_eq!(text_bodies(&control.messages()), vec!["one", "two", "three", "four", "five"]);
}

#[tokio::test]
async fn test_open_channel_with_empty_queue_sends_directly() {
    let mut h = SessionHarness::impolite().await;
    let control = h.factory.latest().open_control_channel();
    settle().await;

    send_texts(&mut h, &["hello"]).await;

    assert!(eventually(|| control.frames().len() == 1).await);
    let ControlMessage::Text { sender, body, .. } = &control.messages()[0] else {
        panic!("expected a text message");
    };
    assert_eq!(sender, "tester");
    assert_eq!(body, "hello");
}

#[tokio::test]
async fn test_failed_send_recovers_on_the_same_open_channel() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.open_control_channel();
    settle().await;

    control.fail_next_sends(1);
    send_texts(&mut h, &["a"]).await;
    settle().await;
    assert!(control.frames().is_empty());

    // the channel opens only once; later sends drain what is waiting first
    send_texts(&mut h, &["b", "c", "d"]).await;
    transport.deliver(
        &control,
        frame(ControlMessage::Text {
            sender: "ann".into(),
            body: "hi".into(),
            timestamp: 31,
        }),
    );

    assert!(eventually(|| control.frames().len() == 5).await);
    let messages = control.messages();
    assert_eq!(text_bodies(&messages), vec!["a", "b", "c", "d"]);
    assert!(matches!(
        messages[4],
        ControlMessage::Ack {
            correlates_to_timestamp: 31,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_flush_on_open_keeps_order() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.control_channel();

    send_texts(&mut h, &["a", "b", "c"]).await;
    control.fail_next_sends(1);
    transport.open(&control);
    settle().await;
    assert!(control.frames().is_empty());

    send_texts(&mut h, &["d"]).await;

    assert!(eventually(|| control.frames().len() == 4).await);
    assert_eq!(text_bodies(&control.messages()), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_timestamps_strictly_increase() {
    let mut h = SessionHarness::impolite().await;

    let timestamps = send_texts(&mut h, &["1", "2", "3", "4", "5", "6", "7", "8"]).await;

    assert!(timestamps.windows(2).all(|w| w[0] < w[1]), "{:?}", timestamps);
}

#[tokio::test]
async fn test_incoming_message_is_acknowledged_and_surfaced() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.open_control_channel();

    transport.deliver(
        &control,
        frame(ControlMessage::Text {
            sender: "ann".into(),
            body: "hi there".into(),
            timestamp: 42,
        }),
    );

    let event = h.next_event(|e| matches!(e, PeerEvent::MessageReceived { .. })).await;
    assert_eq!(
        event,
        Some(PeerEvent::MessageReceived {
            sender: "ann".into(),
            body: "hi there".into(),
            timestamp: 42,
        })
    );

    assert!(eventually(|| !control.frames().is_empty()).await);
    assert!(matches!(
        control.messages()[0],
        ControlMessage::Ack {
            correlates_to_timestamp: 42,
            ..
        }
    ));
}

#[tokio::test]
async fn test_ack_marks_message_delivered_once() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.open_control_channel();
    settle().await;

    let timestamp = send_texts(&mut h, &["ping"]).await[0];
    let ack = || {
        frame(ControlMessage::Ack {
            correlates_to_timestamp: timestamp,
            acked_at: timestamp + 5,
        })
    };

    transport.deliver(&control, ack());
    let delivered = h.next_event(|e| matches!(e, PeerEvent::MessageDelivered { .. })).await;
    assert_eq!(delivered, Some(PeerEvent::MessageDelivered { timestamp }));

    // duplicates and unknown timestamps change nothing
    transport.deliver(&control, ack());
    transport.deliver(
        &control,
        frame(ControlMessage::Ack {
            correlates_to_timestamp: timestamp + 1000,
            acked_at: 0,
        }),
    );
    settle().await;
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, PeerEvent::MessageDelivered { .. }), "unexpected {:?}", event);
    }
}

#[tokio::test]
async fn test_malformed_control_frame_is_dropped() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    let control = transport.open_control_channel();

    transport.deliver(&control, Frame::Text("{not json".into()));
    transport.deliver(&control, Frame::Text(r#"{"type":"text","sender":"ann"}"#.into()));
    settle().await;
    assert!(!h.session.is_finished());

    transport.deliver(
        &control,
        frame(ControlMessage::Text {
            sender: "ann".into(),
            body: "still here".into(),
            timestamp: 7,
        }),
    );
    let event = h.next_event(|e| matches!(e, PeerEvent::MessageReceived { .. })).await;
    assert!(event.is_some());
}

#[tokio::test]
async fn test_queue_survives_transport_reset() {
    let mut h = SessionHarness::impolite().await;

    send_texts(&mut h, &["before reset"]).await;
    h.session.deliver(SignalMessage::Reset);
    assert!(h.factory.wait_for_transports(2).await);

    let transport = h.factory.latest();
    assert!(eventually(|| transport.channel("chat").is_some()).await);
    let control = transport.open_control_channel();

    assert!(eventually(|| control.frames().len() == 1).await);
    assert_eq!(text_bodies(&control.messages()), vec!["before reset"]);
}
