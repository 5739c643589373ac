use crate::control::{
    ControlChannel, FileTransfers, Incoming, MAX_UPLOAD_ATTEMPTS, OutgoingFile, TransferProgress,
};
use crate::error::{NegotiationError, TransportError};
use crate::negotiation::{NegotiationState, RemoteDescriptionAction, ResetOrigin, SignalSink};
use crate::peer::PeerEvent;
use crate::transport::{
    DataChannel, LocalTrack, PeerTransport, TaggedEvent, TransportEvent, TransportEventSink,
    TransportFactory,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tandem_core::{
    ChannelLabel, ControlMessage, Frame, IceCandidate, IceServerConfig, SessionDescription, SignalMessage,
    VideoFilter,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything needed to (re)build a session's transport.
#[derive(Clone)]
pub struct SessionConfig {
    pub polite: bool,
    pub ice_servers: IceServerConfig,
    pub tracks: Vec<LocalTrack>,
    pub display_name: String,
}

impl SessionConfig {
    pub fn new(polite: bool, ice_servers: IceServerConfig, display_name: impl Into<String>) -> Self {
        Self {
            polite,
            ice_servers,
            tracks: Vec::new(),
            display_name: display_name.into(),
        }
    }
}

/// Application requests handled by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SendText(String),
    SendFile { name: String, mime: String, bytes: Bytes },
    AnnounceFilter(VideoFilter),
}

enum SessionInput {
    Signal(SignalMessage),
    Transport(TaggedEvent),
    Command(SessionCommand),
}

/// Owner side of a running session actor.
pub struct SessionHandle {
    signal_tx: mpsc::UnboundedSender<SignalMessage>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Hands a remote signal to the actor. Returns `false` if it has stopped.
    pub fn deliver(&self, signal: SignalMessage) -> bool {
        self.signal_tx.send(signal).is_ok()
    }

    /// Gives the command back if the actor has stopped.
    pub fn command(&self, command: SessionCommand) -> Result<(), SessionCommand> {
        self.command_tx.send(command).map_err(|e| e.0)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels whatever step is in flight, closes the transport and waits for
    /// the actor to exit.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Session task ended abnormally: {}", e);
        }
    }
}

/// The per-session actor. All negotiation, control-channel and transfer
/// state lives here and is touched by one task only.
pub struct PeerSession {
    config: SessionConfig,
    state: NegotiationState,
    factory: Arc<dyn TransportFactory>,
    transport: Box<dyn PeerTransport>,
    generation: u64,
    transport_tx: mpsc::UnboundedSender<TaggedEvent>,
    transport_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    signal_rx: mpsc::UnboundedReceiver<SignalMessage>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    signals: Arc<dyn SignalSink>,
    events: mpsc::UnboundedSender<PeerEvent>,
    control: ControlChannel,
    transfers: FileTransfers,
    announcements: HashMap<u64, Arc<dyn DataChannel>>,
}

impl PeerSession {
    /// Builds the first transport, attaches tracks and the control channel,
    /// and spawns the actor.
    pub async fn start(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
        signals: Arc<dyn SignalSink>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<SessionHandle, TransportError> {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let generation = 1;
        let transport = factory
            .create(&config.ice_servers, TransportEventSink::new(generation, transport_tx.clone()))
            .await?;

        let mut session = Self {
            state: NegotiationState::new(config.polite),
            config,
            factory,
            transport,
            generation,
            transport_tx,
            transport_rx,
            signal_rx,
            command_rx,
            signals,
            events,
            control: ControlChannel::new(),
            transfers: FileTransfers::new(),
            announcements: HashMap::new(),
        };
        session.attach().await?;

        info!(
            "Session started (polite: {}, {} ICE server(s))",
            session.config.polite,
            session.config.ice_servers.len()
        );
        let task = tokio::spawn(session.run(shutdown_rx));

        Ok(SessionHandle {
            signal_tx,
            command_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let input = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                input = self.next_input() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            let result = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                result = self.handle(input) => result,
            };

            if let Err(e) = result {
                error!("Session failed: {}", e);
                self.emit(PeerEvent::SessionFailed(e.to_string()));
                break;
            }
        }

        self.teardown().await;
        debug!("Session actor finished");
    }

    async fn next_input(&mut self) -> Option<SessionInput> {
        tokio::select! {
            Some(event) = self.transport_rx.recv() => Some(SessionInput::Transport(event)),
            Some(signal) = self.signal_rx.recv() => Some(SessionInput::Signal(signal)),
            Some(command) = self.command_rx.recv() => Some(SessionInput::Command(command)),
            else => None,
        }
    }

    async fn handle(&mut self, input: SessionInput) -> Result<(), NegotiationError> {
        match input {
            SessionInput::Signal(signal) => self.handle_signal(signal).await,
            SessionInput::Transport(TaggedEvent { generation, event }) => {
                if generation != self.generation {
                    debug!(
                        "Discarding {:?} from stale transport generation {} (current {})",
                        event, generation, self.generation
                    );
                    return Ok(());
                }
                self.handle_transport_event(event).await
            }
            SessionInput::Command(command) => {
                self.handle_command(command).await;
                Ok(())
            }
        }
    }

    async fn handle_signal(&mut self, signal: SignalMessage) -> Result<(), NegotiationError> {
        match signal {
            SignalMessage::Reset => {
                info!("Peer requested a transport reset");
                self.reset_and_retry(ResetOrigin::RemoteRequest).await
            }
            SignalMessage::Description(description) => self.handle_remote_description(description).await,
            SignalMessage::Candidate(candidate) => {
                self.handle_remote_candidate(candidate).await;
                Ok(())
            }
        }
    }

    async fn handle_remote_description(&mut self, description: SessionDescription) -> Result<(), NegotiationError> {
        let action = self
            .state
            .classify_remote_description(description.sdp_type, self.transport.signaling_state());

        if action == RemoteDescriptionAction::Ignore {
            debug!("Ignoring colliding offer, ours takes precedence");
            return Ok(());
        }

        let is_offer = description.is_offer();
        if let Err(e) = self.transport.set_remote_description(description).await {
            warn!("Failed to apply remote description, resetting transport: {}", e);
            return self.reset_and_retry(ResetOrigin::LocalFailure).await;
        }
        self.state.remote_description_applied();

        if !is_offer {
            return Ok(());
        }

        match self.local_description(false).await {
            Ok(answer) => {
                self.send_signal(SignalMessage::Description(answer)).await;
                self.state.answer_sent();
                Ok(())
            }
            Err(e) => {
                warn!("Failed to produce answer, resetting transport: {}", e);
                self.reset_and_retry(ResetOrigin::LocalFailure).await
            }
        }
    }

    async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        if let Err(e) = self.transport.add_ice_candidate(candidate.clone()).await {
            if self.state.should_report_candidate_error(&candidate) {
                warn!("Failed to add remote ICE candidate: {}", e);
            }
        }
    }

    async fn handle_negotiation_needed(&mut self) -> Result<(), NegotiationError> {
        if !self.state.begin_offer() {
            debug!("Negotiation-needed suppressed while waiting for the peer's offer");
            return Ok(());
        }

        let offer = self.local_description(true).await;
        self.state.finish_offer();

        match offer {
            Ok(offer) => {
                self.send_signal(SignalMessage::Description(offer)).await;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to produce offer, resetting transport: {}", e);
                self.reset_and_retry(ResetOrigin::LocalFailure).await
            }
        }
    }

    /// Applies a fresh local description and returns it. Tries the
    /// parameterless form first and falls back to the explicit two-step path.
    async fn local_description(&mut self, offer: bool) -> Result<SessionDescription, NegotiationError> {
        if let Err(e) = self.transport.set_local_description_implicit().await {
            debug!("Implicit local description unavailable ({}), using explicit path", e);
            let description = if offer {
                self.transport.create_offer().await?
            } else {
                self.transport.create_answer().await?
            };
            self.transport.set_local_description(description).await?;
        }

        self.transport
            .local_description()
            .await
            .ok_or(NegotiationError::MissingLocalDescription)
    }

    /// Drops the current transport and builds a new one from the same
    /// configuration.
    async fn reset_and_retry(&mut self, origin: ResetOrigin) -> Result<(), NegotiationError> {
        let plan = self.state.reset(origin)?;

        self.generation += 1;
        info!(
            "Resetting transport to generation {} ({:?}, attempt {})",
            self.generation,
            origin,
            self.state.consecutive_resets()
        );

        let sink = TransportEventSink::new(self.generation, self.transport_tx.clone());
        let replacement = self.factory.create(&self.config.ice_servers, sink).await?;
        let previous = std::mem::replace(&mut self.transport, replacement);
        if let Err(e) = previous.close().await {
            debug!("Closing replaced transport: {}", e);
        }

        self.control.detach();
        self.transfers.on_reset();
        self.announcements.clear();
        self.attach().await?;

        if plan.send_reset {
            self.send_signal(SignalMessage::Reset).await;
        }
        Ok(())
    }

    async fn attach(&mut self) -> Result<(), TransportError> {
        for track in &self.config.tracks {
            self.transport.add_track(track.clone()).await?;
        }
        let channel = self.transport.open_control_channel().await?;
        self.control.attach(channel);
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), NegotiationError> {
        match event {
            TransportEvent::NegotiationNeeded => return self.handle_negotiation_needed().await,
            TransportEvent::IceCandidate(candidate) => {
                self.send_signal(SignalMessage::Candidate(candidate)).await;
            }
            TransportEvent::ConnectionStateChanged(state) => {
                self.emit(PeerEvent::ConnectionStateChanged(state));
            }
            TransportEvent::ChannelOpen(channel) => self.handle_channel_open(channel).await,
            TransportEvent::RemoteChannel(channel) => self.handle_remote_channel(channel),
            TransportEvent::ChannelMessage { key, frame } => self.handle_channel_message(key, frame).await,
            TransportEvent::ChannelClosed { key } => {
                self.transfers.on_closed(key);
                self.announcements.remove(&key);
            }
        }
        Ok(())
    }

    async fn handle_channel_open(&mut self, channel: Arc<dyn DataChannel>) {
        let key = channel.key();

        if self.control.owns(key) {
            let flushed = self.control.on_open(channel).await;
            info!("Control channel open ({} queued message(s) sent)", flushed);
            self.retry_deferred().await;
            return;
        }

        if self.transfers.has_deferred() {
            self.retry_deferred().await;
        }

        if let Some(announcement) = self.announcements.remove(&key) {
            debug!("Filter announced on '{}', closing", announcement.label());
            let _ = announcement.close().await;
            return;
        }

        if let Err(e) = self.transfers.upload_opened(key).await {
            warn!("Upload on '{}' failed: {}", channel.label(), e);
        }
    }

    fn handle_remote_channel(&mut self, channel: Arc<dyn DataChannel>) {
        match ChannelLabel::parse(channel.label()) {
            ChannelLabel::Filter(filter) => {
                info!("Peer switched to filter {}", filter);
                self.emit(PeerEvent::FilterChanged(filter));
            }
            ChannelLabel::Image(name) => {
                debug!("Peer is sending '{}'", name);
                self.transfers.accept_download(channel);
            }
            ChannelLabel::Control => {}
            ChannelLabel::Unknown(label) => debug!("Ignoring unknown channel '{}'", label),
        }
    }

    async fn handle_channel_message(&mut self, key: u64, frame: Frame) {
        if self.control.owns(key) {
            match self.control.receive(frame).await {
                Ok(Incoming::Message(ControlMessage::Text {
                    sender,
                    body,
                    timestamp,
                })) => self.emit(PeerEvent::MessageReceived {
                    sender,
                    body,
                    timestamp,
                }),
                Ok(Incoming::Message(other)) => debug!("Unexpected control message {:?}", other),
                Ok(Incoming::Acked { timestamp, matched }) => {
                    if matched {
                        self.emit(PeerEvent::MessageDelivered { timestamp });
                    }
                }
                Err(e) => warn!("Dropping malformed control frame: {}", e),
            }
            return;
        }

        if !self.transfers.is_transfer(key) {
            return;
        }
        match self.transfers.on_frame(key, frame).await {
            Ok(TransferProgress::Pending) => {}
            Ok(TransferProgress::Received(file)) => {
                info!("Received '{}' ({} bytes)", file.name, file.bytes.len());
                self.emit(PeerEvent::FileReceived(file));
            }
            Ok(TransferProgress::Delivered { name, timestamp }) => {
                if self.control.mark_delivered(timestamp) {
                    self.emit(PeerEvent::FileDelivered { name, timestamp });
                }
            }
            Err(e) => warn!("File transfer error: {}", e),
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SendText(body) => {
                let timestamp = self.control.send_text(&self.config.display_name, body.clone()).await;
                self.emit(PeerEvent::MessageSent { body, timestamp });
            }
            SessionCommand::SendFile { name, mime, bytes } => {
                let file = OutgoingFile {
                    name,
                    mime,
                    bytes,
                    timestamp: self.control.next_timestamp(),
                };
                self.control.record(file.meta());
                self.retry_deferred().await;
                self.start_upload(file, 0).await;
            }
            SessionCommand::AnnounceFilter(filter) => {
                let label = ChannelLabel::Filter(filter).to_string();
                match self.transport.open_channel(&label).await {
                    Ok(channel) => {
                        self.announcements.insert(channel.key(), channel);
                    }
                    Err(e) => warn!("Could not announce filter {}: {}", filter, e),
                }
            }
        }
    }

    /// Opens the transfer channel for `file`. A failed open is retried on the
    /// next channel open or file send, up to `MAX_UPLOAD_ATTEMPTS` in total.
    async fn start_upload(&mut self, file: OutgoingFile, failures: u32) {
        let e = match self.transport.open_channel(&file.label()).await {
            Ok(channel) => {
                self.transfers.track_upload(channel, file);
                return;
            }
            Err(e) => e,
        };

        let failures = failures + 1;
        if failures >= MAX_UPLOAD_ATTEMPTS {
            error!("Giving up on '{}' after {} failed channel opens: {}", file.name, failures, e);
            self.emit(PeerEvent::FileFailed {
                name: file.name,
                timestamp: file.timestamp,
                reason: e.to_string(),
            });
            return;
        }
        warn!("Could not open channel for '{}', retrying later: {}", file.name, e);
        self.transfers.defer(file, failures);
    }

    async fn retry_deferred(&mut self) {
        for deferred in self.transfers.take_deferred() {
            self.start_upload(deferred.file, deferred.failures).await;
        }
    }

    async fn send_signal(&self, signal: SignalMessage) {
        if let Err(e) = self.signals.send_signal(signal).await {
            warn!("Failed to send signal: {}", e);
        }
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    async fn teardown(&mut self) {
        self.control.discard();
        self.transfers.clear();
        self.announcements.clear();
        if let Err(e) = self.transport.close().await {
            debug!("Closing transport: {}", e);
        }
    }
}
