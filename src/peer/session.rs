//! Peer lifecycle state machine over a Noise transport.
//!
//! A [`PeerSession`] drives one encrypted connection through the BOLT 1
//! bring-up: handshake, init exchange, then application traffic guarded by
//! ping/pong liveness. Everything for one connection runs on the caller's
//! thread; the session suspends only inside timed stream reads and timer
//! waits, so no state is ever shared between two actors.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use rand::RngCore;
use secp256k1::SecretKey;
use zeroize::Zeroize;

use crate::bolt::{BoltError, Init, InitTlvs, Message, Reader, msg_type};
use crate::noise::{Bearer, NoiseTransport, TransportError};

use super::config::{Role, SessionConfig};
use super::features::unknown_required_bit;
use super::pingpong::{LivenessCheck, PingPong, PongFault};

/// Ceiling for the doubling reconnect delay.
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Lifecycle state of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No connection; a reconnect may be pending.
    Pending,
    /// Handshake done, local init sent, peer's init not yet received.
    AwaitingPeerInit,
    /// Init exchange complete; application traffic flows.
    Ready,
    /// Local close in progress; suppresses reconnection.
    Disconnecting,
    /// Connection gone and nothing in flight.
    Disconnected,
}

/// Dials a fresh byte stream for each connection attempt.
pub trait Connector {
    type Stream: Bearer;

    /// Establishes a new stream to the peer.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the dial fails.
    fn connect(&mut self) -> io::Result<Self::Stream>;
}

/// Dials TCP with a connect/read/write timeout.
pub struct TcpConnector {
    pub addr: SocketAddr,
    pub timeout: Duration,
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

/// One-shot connector for an already-accepted stream (responder side).
pub struct Accepted<S>(Option<S>);

impl<S> Accepted<S> {
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self(Some(stream))
    }
}

impl<S: Bearer> Connector for Accepted<S> {
    type Stream = S;

    fn connect(&mut self) -> io::Result<S> {
        self.0.take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                "accepted stream already consumed",
            )
        })
    }
}

/// Fatal session errors. Each one closes the connection.
#[derive(Debug)]
pub enum SessionError {
    /// Transport failure (handshake, frame crypto, or IO).
    Transport(TransportError),
    /// The first message after the handshake was not init.
    UnexpectedMessage(u16),
    /// The peer's init failed to decode.
    MalformedInit(BoltError),
    /// The peer requires a feature bit this node does not implement.
    UnknownRequiredFeature(usize),
    /// The peer never answered a liveness ping.
    PingTimeout,
    /// A pong's size does not match the outstanding ping's request.
    PongSizeMismatch { expected: usize, actual: usize },
    /// A pong arrived with no ping outstanding.
    PongUnsolicited,
    /// The peer proved a static key other than the pinned one.
    RemoteKeyMismatch,
    /// A frame failed BOLT 1 decoding after the session was ready.
    Decode(BoltError),
    /// Operation requires a ready connection.
    NotConnected,
    /// `connect` called while a connection is already up.
    AlreadyConnected,
    /// An initiator config is missing the peer's static public key.
    MissingRemoteKey,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::UnexpectedMessage(t) => write!(f, "expected init, got message type {t}"),
            Self::MalformedInit(e) => write!(f, "malformed init: {e}"),
            Self::UnknownRequiredFeature(bit) => {
                write!(f, "peer requires unknown feature bit {bit}")
            }
            Self::PingTimeout => write!(f, "ping timed out"),
            Self::PongSizeMismatch { expected, actual } => {
                write!(f, "pong size mismatch: expected {expected} got {actual}")
            }
            Self::PongUnsolicited => write!(f, "unsolicited pong"),
            Self::RemoteKeyMismatch => write!(f, "remote static key does not match pinned key"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::NotConnected => write!(f, "session not connected"),
            Self::AlreadyConnected => write!(f, "session already connected"),
            Self::MissingRemoteKey => write!(f, "initiator requires remote_static_pubkey"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::MalformedInit(e) | Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<PongFault> for SessionError {
    fn from(fault: PongFault) -> Self {
        match fault {
            PongFault::Unsolicited => Self::PongUnsolicited,
            PongFault::SizeMismatch { expected, actual } => {
                Self::PongSizeMismatch { expected, actual }
            }
        }
    }
}

/// Observable session activity, in occurrence order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Init exchange complete; the peer is usable.
    Ready,
    /// A decoded inbound message.
    Message(Message),
    /// Encoded bytes handed to the transport (type prefix included).
    Sending(Vec<u8>),
    /// A fatal error; a `Close` follows.
    Error(SessionError),
    /// The connection is gone. A reconnect may follow for an initiator.
    Close,
}

/// Lifecycle and application protocol above one [`NoiseTransport`].
///
/// The session owns at most one transport at a time; reconnection replaces
/// it wholesale, since cipher states cannot outlive their handshake.
pub struct PeerSession<C: Connector> {
    config: SessionConfig,
    connector: C,
    transport: Option<NoiseTransport<C::Stream>>,
    state: PeerState,
    ping: PingPong,
    remote_init: Option<Init>,
    events: VecDeque<SessionEvent>,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
}

impl<C: Connector> PeerSession<C> {
    #[must_use]
    pub fn new(config: SessionConfig, connector: C) -> Self {
        let ping = PingPong::new(config.ping_interval, config.ping_timeout);
        let reconnect_delay = config.reconnect_timeout;
        Self {
            config,
            connector,
            transport: None,
            state: PeerState::Pending,
            ping,
            remote_init: None,
            events: VecDeque::new(),
            reconnect_at: None,
            reconnect_delay,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// The peer's init message, once received.
    #[must_use]
    pub fn remote_init(&self) -> Option<&Init> {
        self.remote_init.as_ref()
    }

    /// Whether a reconnect attempt is scheduled.
    #[must_use]
    pub fn reconnect_scheduled(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Dials the peer, runs the handshake, and sends the local init.
    ///
    /// On success the session is in [`PeerState::AwaitingPeerInit`];
    /// [`next_event`](Self::next_event) drives it the rest of the way.
    ///
    /// # Errors
    ///
    /// Returns an error if the dial, handshake, or init send fails, or if a
    /// pinned remote key does not match.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.try_connect()
    }

    fn try_connect(&mut self) -> Result<(), SessionError> {
        let stream = self
            .connector
            .connect()
            .map_err(|e| SessionError::Transport(TransportError::Io(e)))?;
        let local_ephemeral = fresh_ephemeral();

        let transport = match self.config.role {
            Role::Initiator => {
                let remote = self
                    .config
                    .remote_static_pubkey
                    .ok_or(SessionError::MissingRemoteKey)?;
                NoiseTransport::connect_initiator(
                    stream,
                    self.config.local_static_secret,
                    local_ephemeral,
                    remote,
                )?
            }
            Role::Responder => NoiseTransport::accept_responder(
                stream,
                self.config.local_static_secret,
                local_ephemeral,
            )?,
        };

        // A responder with a pinned key rejects any other initiator before a
        // single frame is exchanged.
        if self.config.role == Role::Responder
            && let Some(pinned) = self.config.remote_static_pubkey
            && transport.remote_static() != pinned
        {
            let mut transport = transport;
            let _ = transport.end();
            return Err(SessionError::RemoteKeyMismatch);
        }

        log::info!("connected to peer {}", transport.remote_static());
        self.transport = Some(transport);
        self.state = PeerState::AwaitingPeerInit;
        self.reconnect_at = None;
        self.reconnect_delay = self.config.reconnect_timeout;

        if let Err(e) = self.send_init() {
            self.state = PeerState::Pending;
            if let Some(mut transport) = self.transport.take() {
                let _ = transport.end();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Sends an application message on a ready session.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless the session is ready, or a transport
    /// error if the write fails.
    pub fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        if self.state != PeerState::Ready {
            return Err(SessionError::NotConnected);
        }
        // Locally-sent pings take part in pong accounting.
        if let Message::Ping(ping) = message {
            self.ping.record_sent(ping, Instant::now());
        }
        self.send_message(message)
    }

    /// Sends pre-encoded message bytes (type prefix included) unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless the session is ready, or a transport
    /// error if the write fails.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if self.state != PeerState::Ready {
            return Err(SessionError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        transport.write(payload)?;
        self.events.push_back(SessionEvent::Sending(payload.to_vec()));
        Ok(())
    }

    /// Closes the connection deliberately. No reconnect follows.
    pub fn disconnect(&mut self) {
        if matches!(
            self.state,
            PeerState::Disconnecting | PeerState::Disconnected
        ) {
            return;
        }
        self.state = PeerState::Disconnecting;
        self.ping.stop();
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.end();
        }
        self.events.push_back(SessionEvent::Close);
        self.state = PeerState::Disconnected;
    }

    /// Returns the next session event, driving I/O and timers as needed.
    ///
    /// Returns `None` once the session is disconnected with no reconnect
    /// pending; the session is finished at that point.
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }

            match self.state {
                PeerState::AwaitingPeerInit | PeerState::Ready => self.pump(),
                PeerState::Pending | PeerState::Disconnected => {
                    if self.reconnect_at.is_some() {
                        self.await_reconnect();
                    } else {
                        return None;
                    }
                }
                // Close completes synchronously in disconnect(); nothing can
                // be in flight here.
                PeerState::Disconnecting => self.state = PeerState::Disconnected,
            }
        }
    }

    /// One scheduling round: liveness first, then a timed read.
    fn pump(&mut self) {
        let now = Instant::now();
        match self.ping.poll(now) {
            LivenessCheck::TimedOut => {
                self.fail(SessionError::PingTimeout);
                return;
            }
            LivenessCheck::SendPing(ping) => {
                log::debug!("liveness ping ({} pong bytes)", ping.num_pong_bytes);
                match self.send_message(&Message::Ping(ping)) {
                    Ok(()) => {}
                    // A write against a dead socket is a close, not a fault.
                    Err(SessionError::Transport(TransportError::Io(ref e)))
                        if is_disconnect(e) =>
                    {
                        self.handle_unsolicited_close();
                    }
                    Err(e) => self.fail(e),
                }
                return;
            }
            LivenessCheck::Idle => {}
        }

        // Block no longer than the next liveness deadline.
        let timeout = self
            .ping
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(now).max(Duration::from_millis(1)));

        let transport = self
            .transport
            .as_mut()
            .expect("connected states always hold a transport");
        if let Err(e) = transport.set_read_timeout(timeout) {
            self.fail(SessionError::Transport(TransportError::Io(e)));
            return;
        }

        match transport.poll_read() {
            Ok(Some(frame)) => self.handle_frame(&frame),
            Ok(None) => {} // timed out; liveness runs next round
            Err(TransportError::Closed) => self.handle_unsolicited_close(),
            Err(TransportError::Io(e)) if is_disconnect(&e) => self.handle_unsolicited_close(),
            Err(e) => self.fail(SessionError::Transport(e)),
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        match self.state {
            PeerState::AwaitingPeerInit => self.handle_first_frame(frame),
            PeerState::Ready => self.handle_ready_frame(frame),
            _ => {}
        }
    }

    /// The first inbound frame must be init; everything else is fatal.
    fn handle_first_frame(&mut self, frame: &[u8]) {
        let mut r = Reader::new(frame);
        let frame_type = match r.u16() {
            Ok(t) => t,
            Err(e) => {
                self.fail(SessionError::MalformedInit(e));
                return;
            }
        };
        if frame_type != msg_type::INIT {
            self.fail(SessionError::UnexpectedMessage(frame_type));
            return;
        }

        let init = match Init::decode(r.rest()) {
            Ok(init) => init,
            Err(e) => {
                self.fail(SessionError::MalformedInit(e));
                return;
            }
        };

        if let Some(bit) = unknown_required_bit(&init.features, &self.config.features) {
            self.fail(SessionError::UnknownRequiredFeature(bit));
            return;
        }
        if let Some(bit) =
            unknown_required_bit(&init.globalfeatures, &self.config.global_features)
        {
            self.fail(SessionError::UnknownRequiredFeature(bit));
            return;
        }

        log::debug!(
            "peer init accepted ({} global, {} local feature bytes)",
            init.globalfeatures.len(),
            init.features.len()
        );
        self.remote_init = Some(init);
        self.ping.start(Instant::now());
        self.state = PeerState::Ready;
        self.events.push_back(SessionEvent::Ready);
    }

    fn handle_ready_frame(&mut self, frame: &[u8]) {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.fail(SessionError::Decode(e));
                return;
            }
        };

        let mut close_after = false;
        match &message {
            Message::Ping(ping) => {
                // Every qualifying ping gets a reply of exactly the
                // requested size.
                if let Some(pong) = PingPong::answer(ping)
                    && let Err(e) = self.send_message(&Message::Pong(pong))
                {
                    self.fail(e);
                    return;
                }
            }
            Message::Pong(pong) => {
                if let Err(fault) = self.ping.on_pong(pong) {
                    self.fail(fault.into());
                    return;
                }
            }
            Message::Error(err) => {
                log::warn!(
                    "peer sent error: {}",
                    err.message().unwrap_or("<non-ascii>")
                );
                close_after = true;
            }
            Message::Warning(warning) => {
                log::warn!(
                    "peer sent warning: {}",
                    warning.message().unwrap_or("<non-ascii>")
                );
            }
            Message::Init(_) | Message::Unknown { .. } => {}
        }

        self.events.push_back(SessionEvent::Message(message));
        if close_after {
            // A peer-declared error ends the connection deliberately, so no
            // reconnect is scheduled.
            self.disconnect();
        }
    }

    /// The stream dropped without a local `disconnect`.
    fn handle_unsolicited_close(&mut self) {
        self.transport = None;
        self.ping.stop();
        self.events.push_back(SessionEvent::Close);

        if self.config.role == Role::Initiator && !self.config.reconnect_timeout.is_zero() {
            log::info!("connection lost; reconnecting in {:?}", self.reconnect_delay);
            self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
            self.state = PeerState::Pending;
        } else {
            self.state = PeerState::Disconnected;
        }
    }

    /// Sleeps out the reconnect delay, then attempts a fresh connection.
    fn await_reconnect(&mut self) {
        let due = self
            .reconnect_at
            .expect("caller checked a reconnect is scheduled");
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.reconnect_at = None;

        match self.try_connect() {
            Ok(()) => log::info!("reconnected"),
            Err(e) => {
                self.reconnect_delay = (self.reconnect_delay * 2).min(RECONNECT_BACKOFF_CAP);
                log::warn!("reconnect failed: {e}; next attempt in {:?}", self.reconnect_delay);
                self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
            }
        }
    }

    /// Encodes and writes a message, reporting it as a `Sending` event.
    fn send_message(&mut self, message: &Message) -> Result<(), SessionError> {
        let encoded = message.encode();
        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        transport.write(&encoded)?;
        self.events.push_back(SessionEvent::Sending(encoded));
        Ok(())
    }

    fn send_init(&mut self) -> Result<(), SessionError> {
        let init = Init {
            globalfeatures: self.config.global_features.clone(),
            features: self.config.features.clone(),
            tlvs: InitTlvs::default(),
        };
        self.send_message(&Message::Init(init))
    }

    /// Tears everything down after a fatal error. Errors never reconnect:
    /// the failure would recur, and rotated nonces cannot be rewound.
    fn fail(&mut self, error: SessionError) {
        log::error!("session failed: {error}");
        self.state = PeerState::Disconnecting;
        self.ping.stop();
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.end();
        }
        self.events.push_back(SessionEvent::Error(error));
        self.events.push_back(SessionEvent::Close);
        self.state = PeerState::Disconnected;
    }
}

/// Stream errors that mean "the peer is gone" rather than "the stream broke".
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Generates a fresh ephemeral key for one handshake attempt.
fn fresh_ephemeral() -> SecretKey {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let candidate = SecretKey::from_byte_array(bytes);
        bytes.zeroize();
        if let Ok(key) = candidate {
            return key;
        }
    }
}
