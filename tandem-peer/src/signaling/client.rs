use crate::config::PeerConfig;
use crate::error::SignalingError;
use crate::negotiation::SignalSink;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tandem_core::{ClientMessage, ConnectionState, RelayMessage, RoomId, SignalMessage};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One peer's connection to the relay, scoped to a single room.
#[derive(Clone)]
pub struct SignalingClient {
    room: RoomId,
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<ConnectionState>,
}

impl SignalingClient {
    /// Connects to the room's relay endpoint. Relay frames arrive on the
    /// returned receiver, which ends when the connection is lost.
    pub async fn connect(
        config: &PeerConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RelayMessage>), SignalingError> {
        let url = config.room_url();
        info!("Connecting to signaling relay: {}", url);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let _ = state_tx.send(ConnectionState::Connected);
        info!("Connected to signaling relay");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, relay_tx, state_tx));

        Ok((
            Self {
                room: config.room.clone(),
                tx,
                state: state_rx,
            },
            relay_rx,
        ))
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn send(&self, message: &ClientMessage) -> Result<(), SignalingError> {
        if self.state() == ConnectionState::Disconnected {
            return Err(SignalingError::Disconnected);
        }
        let json = serde_json::to_string(message)?;
        self.tx
            .send(Message::Text(json.into()))
            .map_err(|_| SignalingError::Disconnected)
    }

    /// Tells the relay we are leaving and closes the socket.
    pub fn leave(&self) {
        if self.send(&ClientMessage::Leave).is_ok() {
            let _ = self.tx.send(Message::Close(None));
        }
    }

    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }

        debug!("Sender task terminated");
    }

    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        relay_tx: mpsc::UnboundedSender<RelayMessage>,
        state: watch::Sender<ConnectionState>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<RelayMessage>(&text) {
                    Ok(message) => {
                        if relay_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Invalid relay message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        let _ = state.send(ConnectionState::Disconnected);
        debug!("Receiver task terminated");
    }
}

#[async_trait]
impl SignalSink for SignalingClient {
    async fn send_signal(&self, signal: SignalMessage) -> Result<(), SignalingError> {
        self.send(&ClientMessage::Signal(signal))
    }
}
