use bytes::Bytes;
use tandem_core::utils::CHUNK_SIZE;
use tandem_core::{ChannelLabel, ControlMessage, Frame, SignalMessage, VideoFilter};
use tandem_peer::{DataChannel, PeerEvent, SessionCommand};

use super::{SessionHarness, eventually, settle};

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

fn image_label(name: &str) -> String {
    ChannelLabel::Image(name.into()).to_string()
}

fn send_file(h: &SessionHarness, name: &str, len: usize) {
    h.session
        .command(SessionCommand::SendFile {
            name: name.into(),
            mime: "image/png".into(),
            bytes: payload(len),
        })
        .unwrap();
}

fn meta_frames(frames: &[Frame]) -> usize {
    frames
        .iter()
        .filter(|f| matches!(ControlMessage::from_frame((*f).clone()), Ok(ControlMessage::ImageMeta { .. })))
        .count()
}

fn meta(name: &str, size: u64, timestamp: u64) -> Frame {
    ControlMessage::ImageMeta {
        name: name.into(),
        mime: "image/png".into(),
        size,
        timestamp,
    }
    .into_frame()
    .unwrap()
}

#[tokio::test]
async fn test_upload_sends_meta_then_chunks_and_completes_on_ack() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    transport.open_control_channel();

    let bytes = payload(2 * CHUNK_SIZE + 100);
    h.session
        .command(SessionCommand::SendFile {
            name: "cat.png".into(),
            mime: "image/png".into(),
            bytes: bytes.clone(),
        })
        .unwrap();

    let label = image_label("cat.png");
    assert!(eventually(|| transport.channel(&label).is_some()).await);
    let channel = transport.channel(&label).unwrap();
    assert!(channel.frames().is_empty(), "nothing is sent before the channel opens");
    transport.open(&channel);

    assert!(eventually(|| channel.frames().len() == 4).await);
    let frames = channel.frames();
    let ControlMessage::ImageMeta { size, timestamp, .. } = ControlMessage::from_frame(frames[0].clone()).unwrap()
    else {
        panic!("first frame must be the meta");
    };
    assert_eq!(size, bytes.len() as u64);

    let mut sent = Vec::new();
    for frame in &frames[1..] {
        let Frame::Binary(chunk) = frame else {
            panic!("chunks travel as binary frames");
        };
        assert!(chunk.len() <= CHUNK_SIZE);
        sent.extend_from_slice(chunk);
    }
    assert_eq!(sent, bytes.to_vec());

    transport.deliver(
        &channel,
        ControlMessage::Ack {
            correlates_to_timestamp: timestamp,
            acked_at: timestamp + 1,
        }
        .into_frame()
        .unwrap(),
    );

    let delivered = h.next_event(|e| matches!(e, PeerEvent::FileDelivered { .. })).await;
    assert_eq!(
        delivered,
        Some(PeerEvent::FileDelivered {
            name: "cat.png".into(),
            timestamp,
        })
    );
    assert!(eventually(|| channel.is_closed()).await);
}

#[tokio::test]
async fn test_download_reassembles_chunks_and_acknowledges() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();

    let bytes = payload(CHUNK_SIZE + 1808);
    let remote = transport.announce_remote_channel(&image_label("dog.png"));
    transport.deliver(&remote, meta("dog.png", bytes.len() as u64, 77));
    transport.deliver(&remote, Frame::Binary(bytes.slice(..CHUNK_SIZE)));
    transport.deliver(&remote, Frame::Binary(bytes.slice(CHUNK_SIZE..)));

    let Some(PeerEvent::FileReceived(file)) = h.next_event(|e| matches!(e, PeerEvent::FileReceived(_))).await
    else {
        panic!("expected the file");
    };
    assert_eq!(file.name, "dog.png");
    assert_eq!(file.mime, "image/png");
    assert_eq!(file.timestamp, 77);
    assert_eq!(file.bytes, bytes);

    assert!(eventually(|| !remote.frames().is_empty()).await);
    assert!(matches!(
        remote.messages()[0],
        ControlMessage::Ack {
            correlates_to_timestamp: 77,
            ..
        }
    ));
}

#[tokio::test]
async fn test_empty_file_completes_on_meta() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();

    let remote = transport.announce_remote_channel(&image_label("empty.png"));
    transport.deliver(&remote, meta("empty.png", 0, 5));

    let Some(PeerEvent::FileReceived(file)) = h.next_event(|e| matches!(e, PeerEvent::FileReceived(_))).await
    else {
        panic!("expected the empty file");
    };
    assert!(file.bytes.is_empty());
}

#[tokio::test]
async fn test_oversized_download_is_dropped() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();

    let remote = transport.announce_remote_channel(&image_label("liar.png"));
    transport.deliver(&remote, meta("liar.png", 10, 9));
    transport.deliver(&remote, Frame::Binary(payload(20)));
    settle().await;

    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, PeerEvent::FileReceived(_)), "unexpected {:?}", event);
    }
    assert!(remote.is_closed());
    assert!(!h.session.is_finished());
}

#[tokio::test]
async fn test_filter_announcement_opens_then_closes_channel() {
    let h = SessionHarness::impolite().await;
    let transport = h.factory.latest();

    h.session
        .command(SessionCommand::AnnounceFilter(VideoFilter::Sepia))
        .unwrap();

    let label = ChannelLabel::Filter(VideoFilter::Sepia).to_string();
    assert!(eventually(|| transport.channel(&label).is_some()).await);
    let channel = transport.channel(&label).unwrap();
    assert!(!channel.is_closed());

    transport.open(&channel);
    assert!(eventually(|| channel.is_closed()).await);
    assert!(channel.frames().is_empty());
}

#[tokio::test]
async fn test_remote_filter_channel_reports_filter_change() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();

    transport.announce_remote_channel(&ChannelLabel::Filter(VideoFilter::Noir).to_string());
    transport.announce_remote_channel("something-else");

    let event = h.next_event(|e| matches!(e, PeerEvent::FilterChanged(_))).await;
    assert_eq!(event, Some(PeerEvent::FilterChanged(VideoFilter::Noir)));
}

#[tokio::test]
async fn test_reset_after_last_chunk_does_not_resend_upload() {
    let h = SessionHarness::impolite().await;
    let first = h.factory.latest();
    first.open_control_channel();

    send_file(&h, "cat.png", CHUNK_SIZE + 10);
    let label = image_label("cat.png");
    assert!(eventually(|| first.channel(&label).is_some()).await);
    let channel = first.channel(&label).unwrap();
    first.open(&channel);
    assert!(eventually(|| channel.frames().len() == 3).await);

    // the ack never arrives before the peer rebuilds
    h.session.deliver(SignalMessage::Reset);
    assert!(h.factory.wait_for_transports(2).await);
    let second = h.factory.latest();
    assert!(eventually(|| second.channel("chat").is_some()).await);
    second.open_control_channel();
    settle().await;

    assert!(second.channel(&label).is_none(), "a fully sent file must not be sent again");
    assert_eq!(meta_frames(&channel.frames()), 1);
}

#[tokio::test]
async fn test_upload_not_yet_started_moves_to_new_transport() {
    let h = SessionHarness::impolite().await;
    let first = h.factory.latest();

    send_file(&h, "late.png", 10);
    let label = image_label("late.png");
    assert!(eventually(|| first.channel(&label).is_some()).await);

    h.session.deliver(SignalMessage::Reset);
    assert!(h.factory.wait_for_transports(2).await);
    let second = h.factory.latest();
    assert!(eventually(|| second.channel("chat").is_some()).await);
    second.open_control_channel();

    assert!(eventually(|| second.channel(&label).is_some()).await);
    let channel = second.channel(&label).unwrap();
    second.open(&channel);
    assert!(eventually(|| channel.frames().len() == 2).await);
    assert!(first.channel(&label).unwrap().frames().is_empty());
}

#[tokio::test]
async fn test_failed_channel_open_is_retried_on_next_send() {
    let h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    transport.fail_next_opens(1);

    send_file(&h, "first.png", 10);
    settle().await;
    assert!(transport.channel(&image_label("first.png")).is_none());

    send_file(&h, "second.png", 10);
    assert!(eventually(|| transport.channel(&image_label("second.png")).is_some()).await);
    let labels: Vec<String> = transport
        .channels()
        .iter()
        .filter(|c| c.label() != "chat")
        .map(|c| c.label().to_string())
        .collect();
    assert_eq!(labels, vec![image_label("first.png"), image_label("second.png")]);

    let first = transport.channel(&image_label("first.png")).unwrap();
    transport.open(&first);
    assert!(eventually(|| first.frames().len() == 2).await);
}

#[tokio::test]
async fn test_failed_channel_open_is_retried_when_a_channel_opens() {
    let h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    transport.fail_next_opens(1);

    send_file(&h, "cat.png", 10);
    settle().await;
    assert!(transport.channel(&image_label("cat.png")).is_none());

    transport.open_control_channel();
    assert!(eventually(|| transport.channel(&image_label("cat.png")).is_some()).await);
}

#[tokio::test]
async fn test_upload_is_reported_failed_after_repeated_open_failures() {
    let mut h = SessionHarness::impolite().await;
    let transport = h.factory.latest();
    transport.fail_next_opens(3);

    send_file(&h, "doomed.png", 10);
    settle().await;
    transport.open_control_channel();
    settle().await;
    transport.open_control_channel();

    let Some(PeerEvent::FileFailed { name, .. }) = h.next_event(|e| matches!(e, PeerEvent::FileFailed { .. })).await
    else {
        panic!("expected the upload to be reported failed");
    };
    assert_eq!(name, "doomed.png");

    transport.open_control_channel();
    settle().await;
    assert!(transport.channel(&image_label("doomed.png")).is_none());
    assert!(!h.session.is_finished());
}
