use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tandem_core::{ControlMessage, Frame};
use tandem_peer::{DataChannel, TransportError, next_channel_key};

/// In-memory data channel recording every frame written to it.
pub struct MockChannel {
    key: u64,
    label: String,
    open: AtomicBool,
    closed: AtomicBool,
    /// Number of upcoming sends that fail.
    failures: AtomicUsize,
    sent: Mutex<Vec<Frame>>,
}

impl MockChannel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            key: next_channel_key(),
            label: label.into(),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Frames decoded back into control messages.
    pub fn messages(&self) -> Vec<ControlMessage> {
        self.frames()
            .into_iter()
            .map(|frame| ControlMessage::from_frame(frame).expect("mock frames are valid"))
            .collect()
    }

    fn record(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransportError::InvalidState("injected send failure".into()));
        }
        self.sent.lock().expect("mock channel lock").push(frame);
        Ok(())
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    fn key(&self) -> u64 {
        self.key
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.record(Frame::Text(text))
    }

    async fn send_binary(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(Frame::Binary(data))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
