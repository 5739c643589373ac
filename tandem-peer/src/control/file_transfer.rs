use crate::error::ControlError;
use crate::transport::DataChannel;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tandem_core::utils::CHUNK_SIZE;
use tandem_core::{ChannelLabel, ControlMessage, Frame};
use tracing::{debug, warn};

/// Channel-open failures tolerated per upload before it is reported failed.
pub const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// A file on its way out: one meta frame followed by fixed-size chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
    pub timestamp: u64,
}

impl OutgoingFile {
    pub fn label(&self) -> String {
        ChannelLabel::Image(self.name.clone()).to_string()
    }

    pub fn meta(&self) -> ControlMessage {
        ControlMessage::ImageMeta {
            name: self.name.clone(),
            mime: self.mime.clone(),
            size: self.bytes.len() as u64,
            timestamp: self.timestamp,
        }
    }

    /// Binary frames of the payload. Empty files have none.
    pub fn chunks(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.bytes.len())
            .step_by(CHUNK_SIZE)
            .map(|start| self.bytes.slice(start..(start + CHUNK_SIZE).min(self.bytes.len())))
    }

    pub async fn send(&self, channel: &dyn DataChannel) -> Result<(), ControlError> {
        channel.send_frame(self.meta().into_frame()?).await?;
        for chunk in self.chunks() {
            channel.send_binary(chunk).await?;
        }
        Ok(())
    }
}

/// A file fully received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
    pub timestamp: u64,
}

/// Reassembles one file from its meta frame and chunks.
#[derive(Debug)]
pub struct IncomingFile {
    name: String,
    mime: String,
    size: u64,
    timestamp: u64,
    buffer: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: String, mime: String, size: u64, timestamp: u64) -> Self {
        Self {
            name,
            mime,
            size,
            timestamp,
            buffer: Vec::with_capacity(size.min(64 * CHUNK_SIZE as u64) as usize),
        }
    }

    pub fn received(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.size
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), ControlError> {
        if self.received() + chunk.len() as u64 > self.size {
            return Err(ControlError::Oversized {
                name: self.name.clone(),
                declared: self.size,
            });
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn finish(self) -> ReceivedFile {
        ReceivedFile {
            name: self.name,
            mime: self.mime,
            bytes: Bytes::from(self.buffer),
            timestamp: self.timestamp,
        }
    }
}

/// An upload waiting for a channel, with the number of failed opens so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredUpload {
    pub file: OutgoingFile,
    pub failures: u32,
}

struct Upload {
    channel: Arc<dyn DataChannel>,
    file: OutgoingFile,
    sent: bool,
}

struct Download {
    channel: Arc<dyn DataChannel>,
    file: Option<IncomingFile>,
}

/// Result of feeding a frame to a transfer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferProgress {
    Pending,
    Received(ReceivedFile),
    /// The peer acknowledged our upload with this timestamp.
    Delivered { name: String, timestamp: u64 },
}

/// Per-transfer channels of one session.
#[derive(Default)]
pub struct FileTransfers {
    uploads: HashMap<u64, Upload>,
    downloads: HashMap<u64, Download>,
    deferred: Vec<DeferredUpload>,
}

impl FileTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_transfer(&self, key: u64) -> bool {
        self.uploads.contains_key(&key) || self.downloads.contains_key(&key)
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.len() + self.deferred.len()
    }

    /// Registers a channel opened for `file`. Sending starts once it opens.
    pub fn track_upload(&mut self, channel: Arc<dyn DataChannel>, file: OutgoingFile) {
        self.uploads.insert(
            channel.key(),
            Upload {
                channel,
                file,
                sent: false,
            },
        );
    }

    /// Keeps `file` until a channel can be opened for it.
    pub fn defer(&mut self, file: OutgoingFile, failures: u32) {
        self.deferred.push(DeferredUpload { file, failures });
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredUpload> {
        std::mem::take(&mut self.deferred)
    }

    /// An upload channel opened: send meta and chunks. Returns `false` if
    /// `key` is not an upload waiting to start.
    pub async fn upload_opened(&mut self, key: u64) -> Result<bool, ControlError> {
        let Some(upload) = self.uploads.get_mut(&key) else {
            return Ok(false);
        };
        if upload.sent {
            return Ok(false);
        }

        upload.file.send(upload.channel.as_ref()).await?;
        upload.sent = true;
        debug!("Sent '{}' ({} bytes)", upload.file.name, upload.file.bytes.len());
        Ok(true)
    }

    /// Accepts a channel the peer opened for a file.
    pub fn accept_download(&mut self, channel: Arc<dyn DataChannel>) {
        self.downloads.insert(channel.key(), Download { channel, file: None });
    }

    pub async fn on_frame(&mut self, key: u64, frame: Frame) -> Result<TransferProgress, ControlError> {
        if let Some(upload) = self.uploads.get(&key) {
            let ControlMessage::Ack {
                correlates_to_timestamp,
                ..
            } = ControlMessage::from_frame(frame)?
            else {
                return Err(ControlError::UnexpectedFrame("non-ack upload"));
            };
            let name = upload.file.name.clone();
            if let Some(upload) = self.uploads.remove(&key) {
                let _ = upload.channel.close().await;
            }
            return Ok(TransferProgress::Delivered {
                name,
                timestamp: correlates_to_timestamp,
            });
        }

        let Some(download) = self.downloads.get_mut(&key) else {
            return Ok(TransferProgress::Pending);
        };

        match ControlMessage::from_frame(frame)? {
            ControlMessage::ImageMeta {
                name,
                mime,
                size,
                timestamp,
            } => {
                if download.file.is_some() {
                    return Err(ControlError::UnexpectedFrame("second meta"));
                }
                download.file = Some(IncomingFile::new(name, mime, size, timestamp));
            }
            ControlMessage::ImageChunk { bytes } => {
                let Some(file) = download.file.as_mut() else {
                    return Err(ControlError::UnexpectedFrame("chunk before meta"));
                };
                if let Err(e) = file.push(&bytes) {
                    self.abort_download(key).await;
                    return Err(e);
                }
            }
            _ => return Err(ControlError::UnexpectedFrame("control")),
        }

        if !download.file.as_ref().is_some_and(IncomingFile::is_complete) {
            return Ok(TransferProgress::Pending);
        }

        let Some(Download { channel, file: Some(file) }) = self.downloads.remove(&key) else {
            return Ok(TransferProgress::Pending);
        };
        let received = file.finish();
        let ack = ControlMessage::Ack {
            correlates_to_timestamp: received.timestamp,
            acked_at: tandem_core::utils::now_millis(),
        };
        if let Err(e) = channel.send_frame(ack.into_frame()?).await {
            warn!("Failed to acknowledge '{}': {}", received.name, e);
        }
        Ok(TransferProgress::Received(received))
    }

    /// The channel went away. Uploads that never got acknowledged are kept
    /// for the next transport only if they had not been sent.
    pub fn on_closed(&mut self, key: u64) {
        if let Some(upload) = self.uploads.remove(&key) {
            if !upload.sent {
                self.defer(upload.file, 0);
            }
        }
        if let Some(download) = self.downloads.remove(&key) {
            if let Some(file) = download.file {
                warn!("Channel closed after {} of '{}'", file.received(), file.name);
            }
        }
    }

    /// The transport is being replaced. Uploads that never started sending
    /// move to the next one; fully sent ones are not repeated. Partial
    /// downloads are dropped.
    pub fn on_reset(&mut self) {
        for (_, upload) in self.uploads.drain() {
            if upload.sent {
                debug!("'{}' was sent before the reset, not resending", upload.file.name);
            } else {
                self.deferred.push(DeferredUpload {
                    file: upload.file,
                    failures: 0,
                });
            }
        }
        self.downloads.clear();
    }

    pub fn clear(&mut self) {
        self.uploads.clear();
        self.downloads.clear();
        self.deferred.clear();
    }

    async fn abort_download(&mut self, key: u64) {
        if let Some(download) = self.downloads.remove(&key) {
            let _ = download.channel.close().await;
        }
    }
}
