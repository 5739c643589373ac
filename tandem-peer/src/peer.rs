use crate::config::PeerConfig;
use crate::control::ReceivedFile;
use crate::error::PeerError;
use crate::negotiation::{PeerSession, SessionCommand, SessionConfig, SessionHandle, SignalSink};
use crate::signaling::SignalingClient;
use crate::transport::TransportFactory;
use bytes::Bytes;
use std::sync::Arc;
use tandem_core::{ConnectionState, IceServerConfig, RelayMessage, RoomId, VideoFilter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the application hears about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Joined {
        room: RoomId,
        peer_count: usize,
        polite: bool,
    },
    RoomFull,
    PeerConnected,
    PeerDisconnected,
    ConnectionStateChanged(ConnectionState),
    MessageSent {
        body: String,
        timestamp: u64,
    },
    MessageReceived {
        sender: String,
        body: String,
        timestamp: u64,
    },
    MessageDelivered {
        timestamp: u64,
    },
    FileReceived(ReceivedFile),
    FileDelivered {
        name: String,
        timestamp: u64,
    },
    /// No transfer channel could be opened for an upload.
    FileFailed {
        name: String,
        timestamp: u64,
        reason: String,
    },
    FilterChanged(VideoFilter),
    /// The session gave up; the relay connection stays up.
    SessionFailed(String),
    /// The relay connection is gone. Nothing reconnects automatically.
    ConnectionLost,
}

/// The relay side as the orchestrator needs it.
pub trait RelayLink: SignalSink {
    fn leave(&self);
}

impl RelayLink for SignalingClient {
    fn leave(&self) {
        SignalingClient::leave(self);
    }
}

/// A participant in one room: follows relay notifications, runs a session
/// while paired and buffers application commands while not.
pub struct Peer {
    commands: mpsc::UnboundedSender<SessionCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Peer {
    pub async fn connect(
        config: PeerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PeerEvent>), PeerError> {
        let (client, relay_rx) = SignalingClient::connect(&config).await?;
        Ok(Self::spawn(config, Arc::new(client), relay_rx, factory))
    }

    /// Runs the orchestrator over an existing relay link.
    pub fn spawn<L: RelayLink + 'static>(
        config: PeerConfig,
        link: Arc<L>,
        relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let signals: Arc<dyn SignalSink> = link.clone();
        let runner = PeerRunner {
            config,
            link,
            signals,
            factory,
            events: events_tx,
            relay_rx,
            command_rx,
            ice_servers: IceServerConfig::default_servers(),
            polite: false,
            session: None,
            pending: Vec::new(),
        };
        let task = tokio::spawn(runner.run(shutdown_rx));

        (
            Self {
                commands: command_tx,
                shutdown: Some(shutdown_tx),
                task,
            },
            events_rx,
        )
    }

    pub fn send_text(&self, body: impl Into<String>) -> Result<(), PeerError> {
        self.command(SessionCommand::SendText(body.into()))
    }

    pub fn send_file(&self, name: impl Into<String>, mime: impl Into<String>, bytes: Bytes) -> Result<(), PeerError> {
        self.command(SessionCommand::SendFile {
            name: name.into(),
            mime: mime.into(),
            bytes,
        })
    }

    pub fn announce_filter(&self, filter: VideoFilter) -> Result<(), PeerError> {
        self.command(SessionCommand::AnnounceFilter(filter))
    }

    /// Leaves the room and waits for the session to shut down.
    pub async fn leave(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Peer task ended abnormally: {}", e);
        }
    }

    fn command(&self, command: SessionCommand) -> Result<(), PeerError> {
        self.commands.send(command).map_err(|_| PeerError::Stopped)
    }
}

struct PeerRunner {
    config: PeerConfig,
    link: Arc<dyn RelayLink>,
    signals: Arc<dyn SignalSink>,
    factory: Arc<dyn TransportFactory>,
    events: mpsc::UnboundedSender<PeerEvent>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ice_servers: IceServerConfig,
    polite: bool,
    session: Option<SessionHandle>,
    pending: Vec<SessionCommand>,
}

impl PeerRunner {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Leaving room {}", self.config.room);
                    self.link.leave();
                    break;
                }
                message = self.relay_rx.recv() => match message {
                    Some(message) => {
                        if !self.handle_relay_message(message).await {
                            break;
                        }
                    }
                    None => {
                        error!("Lost connection to the signaling relay");
                        self.emit(PeerEvent::ConnectionLost);
                        break;
                    }
                },
                Some(command) = self.command_rx.recv() => self.handle_command(command),
            }
        }

        self.stop_session().await;
    }

    /// Returns `false` when the peer should stop.
    async fn handle_relay_message(&mut self, message: RelayMessage) -> bool {
        match message {
            RelayMessage::IceServers(servers) => {
                debug!("Relay provided {} ICE server(s)", servers.len());
                self.ice_servers = servers;
            }
            RelayMessage::Joined { peer_count, polite } => {
                info!("Joined {} ({} present, polite: {})", self.config.room, peer_count, polite);
                self.polite = polite;
                self.emit(PeerEvent::Joined {
                    room: self.config.room.clone(),
                    peer_count,
                    polite,
                });
                if peer_count >= 2 {
                    self.start_session().await;
                }
            }
            RelayMessage::RoomFull => {
                warn!("Room {} is full", self.config.room);
                self.emit(PeerEvent::RoomFull);
                return false;
            }
            RelayMessage::PeerConnected => {
                self.emit(PeerEvent::PeerConnected);
                self.start_session().await;
            }
            RelayMessage::PeerDisconnected { polite } => {
                info!("Peer left {}", self.config.room);
                self.stop_session().await;
                self.polite = polite;
                self.emit(PeerEvent::PeerDisconnected);
            }
            RelayMessage::Signal(signal) => match &self.session {
                Some(session) => {
                    if !session.deliver(signal) {
                        warn!("Session is gone, dropping signal");
                    }
                }
                None => debug!("Dropping signal received while unpaired"),
            },
        }
        true
    }

    fn handle_command(&mut self, command: SessionCommand) {
        let Some(session) = &self.session else {
            self.pending.push(command);
            return;
        };
        if let Err(command) = session.command(command) {
            self.pending.push(command);
        }
    }

    async fn start_session(&mut self) {
        if self.session.as_ref().is_some_and(|s| !s.is_finished()) {
            return;
        }

        let config = SessionConfig::new(self.polite, self.ice_servers.clone(), self.config.display_name.clone());
        match PeerSession::start(config, self.factory.clone(), self.signals.clone(), self.events.clone()).await {
            Ok(session) => {
                for command in self.pending.drain(..) {
                    if let Err(command) = session.command(command) {
                        warn!("Session stopped before replaying {:?}", command);
                    }
                }
                self.session = Some(session);
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                self.emit(PeerEvent::SessionFailed(e.to_string()));
            }
        }
    }

    async fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }
}
