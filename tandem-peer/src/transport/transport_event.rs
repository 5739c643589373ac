use crate::transport::DataChannel;
use std::sync::Arc;
use tandem_core::{ConnectionState, Frame, IceCandidate};
use tokio::sync::mpsc;

/// Callbacks of a peer transport, turned into values for the session actor.
pub enum TransportEvent {
    /// Local tracks or channels changed and a new offer is due.
    NegotiationNeeded,

    /// A local candidate was gathered. The empty candidate marks the end of
    /// gathering.
    IceCandidate(IceCandidate),

    ConnectionStateChanged(ConnectionState),

    /// A channel created on this side, or announced by the remote side,
    /// is now open.
    ChannelOpen(Arc<dyn DataChannel>),

    /// The remote side created a channel.
    RemoteChannel(Arc<dyn DataChannel>),

    ChannelMessage { key: u64, frame: Frame },

    ChannelClosed { key: u64 },
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegotiationNeeded => write!(f, "NegotiationNeeded"),
            Self::IceCandidate(c) => write!(f, "IceCandidate({:?})", c.candidate),
            Self::ConnectionStateChanged(s) => write!(f, "ConnectionStateChanged({:?})", s),
            Self::ChannelOpen(ch) => write!(f, "ChannelOpen({}#{})", ch.label(), ch.key()),
            Self::RemoteChannel(ch) => write!(f, "RemoteChannel({}#{})", ch.label(), ch.key()),
            Self::ChannelMessage { key, .. } => write!(f, "ChannelMessage(#{})", key),
            Self::ChannelClosed { key } => write!(f, "ChannelClosed(#{})", key),
        }
    }
}

/// An event stamped with the generation of the transport that raised it.
#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Where a transport pushes its events. Each transport gets its own sink
/// carrying its generation, so late callbacks from a replaced transport can
/// be told apart.
#[derive(Clone)]
pub struct TransportEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl TransportEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
