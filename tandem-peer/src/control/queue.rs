use crate::error::ControlError;
use crate::transport::DataChannel;
use std::collections::VecDeque;
use tandem_core::ControlMessage;

/// Messages waiting for the control channel, oldest first.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<ControlMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ControlMessage) {
        self.pending.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlMessage> {
        self.pending.iter()
    }

    /// Sends everything in submission order. On the first failure the failed
    /// message and everything after it stay queued, still in order.
    pub async fn flush(&mut self, channel: &dyn DataChannel) -> Result<usize, ControlError> {
        let mut sent = 0;
        while let Some(message) = self.pending.pop_front() {
            if let Err(e) = transmit(channel, &message).await {
                self.pending.push_front(message);
                return Err(e);
            }
            sent += 1;
        }
        Ok(sent)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

pub(crate) async fn transmit(channel: &dyn DataChannel, message: &ControlMessage) -> Result<(), ControlError> {
    let frame = message.clone().into_frame()?;
    channel.send_frame(frame).await?;
    Ok(())
}
