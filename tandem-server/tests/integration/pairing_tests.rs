use tandem_core::{RelayMessage, RoomId, SessionId};
use tandem_server::RelayError;

use crate::integration::{create_test_relay, init_tracing};

fn room() -> RoomId {
    RoomId::parse("quiet-otter").unwrap()
}

#[tokio::test]
async fn test_first_joiner_impolite_second_polite() {
    init_tracing();
    let (relay, output, _rx) = create_test_relay();
    let (a, b) = (SessionId::new(), SessionId::new());

    assert_eq!(relay.join(&room(), a).await.unwrap(), 1);
    assert_eq!(relay.join(&room(), b).await.unwrap(), 2);

    assert_eq!(
        output.messages_for(a).await,
        vec![
            RelayMessage::Joined {
                peer_count: 1,
                polite: false
            },
            RelayMessage::PeerConnected,
        ]
    );
    assert_eq!(
        output.messages_for(b).await,
        vec![RelayMessage::Joined {
            peer_count: 2,
            polite: true
        }],
        "the joiner itself never gets peer-connected"
    );
}

#[tokio::test]
async fn test_third_joiner_is_never_paired() {
    init_tracing();
    let (relay, output, _rx) = create_test_relay();
    let (a, b, c) = (SessionId::new(), SessionId::new(), SessionId::new());

    relay.join(&room(), a).await.unwrap();
    relay.join(&room(), b).await.unwrap();

    let err = relay.join(&room(), c).await.unwrap_err();
    assert!(matches!(err, RelayError::RoomFull { .. }));
    assert_eq!(output.messages_for(c).await, vec![RelayMessage::RoomFull]);

    assert!(!relay.relay(&room(), c, tandem_core::SignalMessage::Reset).await);
    assert_eq!(
        output
            .count_for(a, |m| matches!(m, RelayMessage::Signal(_)))
            .await,
        0
    );
    assert_eq!(
        output
            .count_for(b, |m| matches!(m, RelayMessage::Signal(_)))
            .await,
        0
    );
    assert_eq!(
        output
            .count_for(a, |m| matches!(m, RelayMessage::PeerConnected))
            .await,
        1
    );
}

#[tokio::test]
async fn test_leave_notifies_and_demotes_remaining() {
    init_tracing();
    let (relay, output, _rx) = create_test_relay();
    let (a, b, c) = (SessionId::new(), SessionId::new(), SessionId::new());

    relay.join(&room(), a).await.unwrap();
    relay.join(&room(), b).await.unwrap();
    relay.leave(&room(), a).await;

    assert_eq!(
        output.messages_for(b).await.last(),
        Some(&RelayMessage::PeerDisconnected { polite: false })
    );

    relay.join(&room(), c).await.unwrap();
    assert_eq!(
        output.messages_for(c).await,
        vec![RelayMessage::Joined {
            peer_count: 2,
            polite: true
        }]
    );
    assert_eq!(
        output.messages_for(b).await.last(),
        Some(&RelayMessage::PeerConnected)
    );
}

#[tokio::test]
async fn test_leave_is_idempotent_and_room_is_reusable() {
    init_tracing();
    let (relay, output, _rx) = create_test_relay();
    let (a, b) = (SessionId::new(), SessionId::new());

    relay.join(&room(), a).await.unwrap();
    relay.leave(&room(), a).await;
    relay.leave(&room(), a).await;
    assert_eq!(relay.rooms().room_count(), 0);
    assert_eq!(output.total().await, 1);

    assert_eq!(relay.join(&room(), b).await.unwrap(), 1);
    assert_eq!(
        output.messages_for(b).await,
        vec![RelayMessage::Joined {
            peer_count: 1,
            polite: false
        }]
    );
}
