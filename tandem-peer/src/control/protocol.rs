use crate::control::OutboundQueue;
use crate::control::queue::transmit;
use crate::error::ControlError;
use crate::transport::DataChannel;
use std::sync::Arc;
use tandem_core::utils::now_millis;
use tandem_core::{ControlMessage, Frame};
use tracing::{debug, warn};

/// Wall-clock milliseconds, bumped so consecutive readings never repeat.
#[derive(Debug, Default)]
pub struct MessageClock {
    last: u64,
}

impl MessageClock {
    pub fn next(&mut self) -> u64 {
        self.last = now_millis().max(self.last + 1);
        self.last
    }
}

/// A message this side sent, and whether the peer confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: ControlMessage,
    pub delivered: bool,
}

/// What an incoming control frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Message(ControlMessage),
    /// The peer confirmed the message with this timestamp. `matched` is
    /// `false` when nothing undelivered carried it.
    Acked { timestamp: u64, matched: bool },
}

/// Chat over the fixed control channel: acknowledged delivery on top of a
/// channel that may drop or reorder.
///
/// Direct sends and queue flushes both go through `&mut self`, so the owner
/// serializes them.
#[derive(Default)]
pub struct ControlChannel {
    channel: Option<Arc<dyn DataChannel>>,
    queue: OutboundQueue,
    history: Vec<SentMessage>,
    clock: MessageClock,
}

impl ControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the channel of a fresh transport. It usually is not open yet.
    pub fn attach(&mut self, channel: Arc<dyn DataChannel>) {
        self.channel = Some(channel);
    }

    /// Forgets the channel of a transport that is being replaced. Queued
    /// messages stay.
    pub fn detach(&mut self) {
        self.channel = None;
    }

    pub fn owns(&self, key: u64) -> bool {
        self.channel.as_ref().is_some_and(|c| c.key() == key)
    }

    pub fn is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn next_timestamp(&mut self) -> u64 {
        self.clock.next()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn history(&self) -> &[SentMessage] {
        &self.history
    }

    pub fn is_delivered(&self, timestamp: u64) -> bool {
        self.history
            .iter()
            .any(|m| m.delivered && m.message.ack_timestamp() == Some(timestamp))
    }

    /// Sends a chat message and records it for acknowledgment. Returns its
    /// timestamp.
    pub async fn send_text(&mut self, sender: &str, body: String) -> u64 {
        let timestamp = self.clock.next();
        let message = ControlMessage::Text {
            sender: sender.to_owned(),
            body,
            timestamp,
        };
        self.record(message.clone());
        self.send(message).await;
        timestamp
    }

    /// Keeps a copy of an outgoing message so its ack can be matched.
    pub fn record(&mut self, message: ControlMessage) {
        self.history.push(SentMessage {
            message,
            delivered: false,
        });
    }

    /// Transmits right away when the channel is open and nothing is waiting
    /// ahead of it. Otherwise the message goes behind the queue, and an open
    /// channel drains the queue first. Never loses the message.
    pub async fn send(&mut self, message: ControlMessage) {
        let channel = match &self.channel {
            Some(channel) if channel.is_open() => channel.clone(),
            _ => {
                self.queue.push(message);
                return;
            }
        };

        if !self.queue.is_empty() {
            self.queue.push(message);
            self.flush().await;
            return;
        }

        if let Err(e) = transmit(channel.as_ref(), &message).await {
            warn!("Control send failed, queueing for retry: {}", e);
            self.queue.push(message);
        }
    }

    /// The control channel opened: bind it and drain the queue.
    pub async fn on_open(&mut self, channel: Arc<dyn DataChannel>) -> usize {
        self.channel = Some(channel);
        self.flush().await
    }

    pub async fn flush(&mut self) -> usize {
        let Some(channel) = self.channel.clone() else {
            return 0;
        };
        match self.queue.flush(channel.as_ref()).await {
            Ok(sent) => {
                if sent > 0 {
                    debug!("Flushed {} queued control message(s)", sent);
                }
                sent
            }
            Err(e) => {
                warn!("Flush interrupted with {} message(s) left: {}", self.queue.len(), e);
                0
            }
        }
    }

    /// Handles one frame from the control channel. Non-ack messages are
    /// acknowledged before being handed back.
    pub async fn receive(&mut self, frame: Frame) -> Result<Incoming, ControlError> {
        let message = ControlMessage::from_frame(frame)?;

        if let ControlMessage::Ack {
            correlates_to_timestamp,
            ..
        } = message
        {
            let matched = self.mark_delivered(correlates_to_timestamp);
            return Ok(Incoming::Acked {
                timestamp: correlates_to_timestamp,
                matched,
            });
        }

        if let Some(timestamp) = message.ack_timestamp() {
            let ack = ControlMessage::Ack {
                correlates_to_timestamp: timestamp,
                acked_at: self.clock.next(),
            };
            self.send(ack).await;
        }

        Ok(Incoming::Message(message))
    }

    /// Marks the first undelivered record with `timestamp` as delivered.
    pub fn mark_delivered(&mut self, timestamp: u64) -> bool {
        match self
            .history
            .iter_mut()
            .find(|m| !m.delivered && m.message.ack_timestamp() == Some(timestamp))
        {
            Some(entry) => {
                entry.delivered = true;
                true
            }
            None => false,
        }
    }

    /// Session closed: nothing queued survives.
    pub fn discard(&mut self) {
        self.channel = None;
        self.queue.clear();
    }
}
