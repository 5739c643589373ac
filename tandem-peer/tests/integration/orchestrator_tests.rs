use std::sync::Arc;
use std::time::Duration;
use tandem_core::{ControlMessage, IceServerConfig, RelayMessage, RoomId, SessionDescription, SignalMessage};
use tandem_peer::{Peer, PeerConfig, PeerEvent};
use tokio::sync::mpsc;

use super::{EVENT_TIMEOUT_MS, eventually, init_tracing, is_offer, settle, wait_for_event};
use crate::utils::{MockSignalSink, MockTransportFactory, MockTransportOptions, wait_for_signal};

struct PeerHarness {
    peer: Peer,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    relay: mpsc::UnboundedSender<RelayMessage>,
    sink: MockSignalSink,
    signals: mpsc::UnboundedReceiver<SignalMessage>,
    factory: MockTransportFactory,
}

fn spawn_peer() -> PeerHarness {
    init_tracing();
    let room = RoomId::parse("quiet-harbor").unwrap();
    let config = PeerConfig::new("ws://relay.invalid", room, "tester");
    let factory = MockTransportFactory::new(MockTransportOptions::default());
    let (sink, signals) = MockSignalSink::new();
    let (relay, relay_rx) = mpsc::unbounded_channel();

    let (peer, events) = Peer::spawn(config, Arc::new(sink.clone()), relay_rx, Arc::new(factory.clone()));

    PeerHarness {
        peer,
        events,
        relay,
        sink,
        signals,
        factory,
    }
}

#[tokio::test]
async fn test_second_member_starts_session_on_join() {
    let mut h = spawn_peer();

    h.relay.send(RelayMessage::IceServers(IceServerConfig::default_servers())).unwrap();
    h.relay
        .send(RelayMessage::Joined {
            peer_count: 2,
            polite: true,
        })
        .unwrap();

    let joined = wait_for_event(&mut h.events, |e| matches!(e, PeerEvent::Joined { .. })).await;
    assert_eq!(
        joined,
        Some(PeerEvent::Joined {
            room: RoomId::parse("quiet-harbor").unwrap(),
            peer_count: 2,
            polite: true,
        })
    );
    assert!(h.factory.wait_for_transports(1).await);
    assert!(wait_for_signal(&mut h.signals, is_offer).await.is_some());
}

#[tokio::test]
async fn test_first_member_waits_for_peer() {
    let mut h = spawn_peer();

    h.relay
        .send(RelayMessage::Joined {
            peer_count: 1,
            polite: false,
        })
        .unwrap();
    // signals with no session to take them are dropped
    h.relay.send(RelayMessage::Signal(SignalMessage::Reset)).unwrap();
    settle().await;
    assert_eq!(h.factory.created(), 0);

    h.relay.send(RelayMessage::PeerConnected).unwrap();
    assert!(wait_for_event(&mut h.events, |e| *e == PeerEvent::PeerConnected).await.is_some());
    assert!(h.factory.wait_for_transports(1).await);
}

#[tokio::test]
async fn test_commands_issued_while_unpaired_are_replayed() {
    let mut h = spawn_peer();

    h.peer.send_text("sent early").unwrap();
    h.relay
        .send(RelayMessage::Joined {
            peer_count: 1,
            polite: false,
        })
        .unwrap();
    settle().await;
    assert_eq!(h.factory.created(), 0);

    h.relay.send(RelayMessage::PeerConnected).unwrap();
    assert!(h.factory.wait_for_transports(1).await);

    let sent = wait_for_event(&mut h.events, |e| matches!(e, PeerEvent::MessageSent { .. })).await;
    assert!(matches!(sent, Some(PeerEvent::MessageSent { ref body, .. }) if body == "sent early"));

    let transport = h.factory.latest();
    let control = transport.open_control_channel();
    assert!(eventually(|| control.frames().len() == 1).await);
    assert!(matches!(
        &control.messages()[0],
        ControlMessage::Text { body, .. } if body == "sent early"
    ));
}

#[tokio::test]
async fn test_relay_signals_reach_the_session() {
    let mut h = spawn_peer();

    h.relay
        .send(RelayMessage::Joined {
            peer_count: 2,
            polite: false,
        })
        .unwrap();
    assert!(wait_for_signal(&mut h.signals, is_offer).await.is_some());

    h.relay
        .send(RelayMessage::Signal(SignalMessage::Description(SessionDescription::answer(
            "v=0 answer",
        ))))
        .unwrap();

    let transport = h.factory.latest();
    assert!(eventually(|| transport.applied_remote().len() == 1).await);
}

#[tokio::test]
async fn test_peer_disconnect_stops_session_and_takes_new_role() {
    let mut h = spawn_peer();

    h.relay
        .send(RelayMessage::Joined {
            peer_count: 2,
            polite: false,
        })
        .unwrap();
    assert!(wait_for_signal(&mut h.signals, is_offer).await.is_some());
    let first = h.factory.latest();

    h.relay.send(RelayMessage::PeerDisconnected { polite: true }).unwrap();
    assert!(wait_for_event(&mut h.events, |e| *e == PeerEvent::PeerDisconnected).await.is_some());
    assert!(first.is_closed());

    h.relay.send(RelayMessage::PeerConnected).unwrap();
    assert!(h.factory.wait_for_transports(2).await);
    assert!(wait_for_signal(&mut h.signals, is_offer).await.is_some());

    // now polite: a colliding offer it cannot roll back leads to a reset
    h.relay
        .send(RelayMessage::Signal(SignalMessage::Description(SessionDescription::offer(
            "v=0 newcomer",
        ))))
        .unwrap();
    let reset = wait_for_signal(&mut h.signals, |s| matches!(s, SignalMessage::Reset)).await;
    assert!(reset.is_some());
}

#[tokio::test]
async fn test_room_full_ends_the_peer() {
    let mut h = spawn_peer();

    h.relay.send(RelayMessage::RoomFull).unwrap();

    assert!(wait_for_event(&mut h.events, |e| *e == PeerEvent::RoomFull).await.is_some());
    let closed = tokio::time::timeout(Duration::from_millis(EVENT_TIMEOUT_MS), h.events.recv()).await;
    assert!(matches!(closed, Ok(None)), "event stream should end");
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test]
async fn test_lost_relay_connection_is_reported() {
    let mut h = spawn_peer();

    h.relay
        .send(RelayMessage::Joined {
            peer_count: 2,
            polite: false,
        })
        .unwrap();
    assert!(h.factory.wait_for_transports(1).await);
    let transport = h.factory.latest();

    drop(h.relay);

    assert!(wait_for_event(&mut h.events, |e| *e == PeerEvent::ConnectionLost).await.is_some());
    assert!(eventually(|| transport.is_closed()).await);
    assert!(!h.sink.has_left());
}

#[tokio::test]
async fn test_leave_notifies_relay_and_closes_session() {
    let h = spawn_peer();

    h.relay
        .send(RelayMessage::Joined {
            peer_count: 2,
            polite: false,
        })
        .unwrap();
    assert!(h.factory.wait_for_transports(1).await);
    let transport = h.factory.latest();

    h.peer.leave().await;

    assert!(h.sink.has_left());
    assert!(transport.is_closed());
}
