//! Session state-machine tests against scripted peers, plus TCP end-to-end.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::bolt::{Error as ErrorMsg, Init, Message, Ping, Pong};
use crate::noise::{Bearer, NoiseTransport};

use super::{
    Accepted, Connector, PeerSession, PeerState, SessionConfig, SessionError, SessionEvent,
};

// ----- deterministic keys -----

fn secret(byte: u8) -> SecretKey {
    SecretKey::from_byte_array([byte; 32]).expect("valid secret key")
}

fn initiator_static() -> SecretKey {
    secret(0x11)
}

fn responder_static() -> SecretKey {
    secret(0x21)
}

fn responder_pubkey() -> PublicKey {
    PublicKey::from_secret_key(&Secp256k1::new(), &responder_static())
}

// ----- in-memory duplex pipe -----

#[derive(Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

type Shared = Arc<(Mutex<PipeState>, Condvar)>;

/// One end of a bidirectional in-memory byte pipe with read timeouts.
struct PipeStream {
    inbound: Shared,
    outbound: Shared,
    read_timeout: Option<Duration>,
}

fn pipe() -> (PipeStream, PipeStream) {
    let a: Shared = Arc::default();
    let b: Shared = Arc::default();
    (
        PipeStream {
            inbound: Arc::clone(&a),
            outbound: Arc::clone(&b),
            read_timeout: None,
        },
        PipeStream {
            inbound: b,
            outbound: a,
            read_timeout: None,
        },
    )
}

impl Read for PipeStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let (lock, cvar) = &*self.inbound;
        let mut state = lock.lock().unwrap();
        loop {
            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                for slot in out.iter_mut().take(n) {
                    *slot = state.buf.pop_front().unwrap();
                }
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            match self.read_timeout {
                Some(timeout) => {
                    let (next, result) = cvar.wait_timeout(state, timeout).unwrap();
                    state = next;
                    if result.timed_out() && state.buf.is_empty() && !state.closed {
                        return Err(io::Error::new(
                            io::ErrorKind::WouldBlock,
                            "pipe read timed out",
                        ));
                    }
                }
                None => state = cvar.wait(state).unwrap(),
            }
        }
    }
}

impl Write for PipeStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let (lock, cvar) = &*self.outbound;
        let mut state = lock.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.buf.extend(data);
        cvar.notify_all();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Bearer for PipeStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        for shared in [&self.inbound, &self.outbound] {
            let (lock, cvar) = &**shared;
            lock.lock().unwrap().closed = true;
            cvar.notify_all();
        }
        Ok(())
    }
}

impl Drop for PipeStream {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Connector yielding a queue of pre-built streams, one per attempt.
struct QueueConnector {
    streams: VecDeque<PipeStream>,
}

impl Connector for QueueConnector {
    type Stream = PipeStream;

    fn connect(&mut self) -> io::Result<PipeStream> {
        self.streams
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream queued"))
    }
}

// ----- scripted raw peers -----

/// Runs the responder side of the handshake on a raw transport.
fn raw_responder(stream: PipeStream) -> NoiseTransport<PipeStream> {
    NoiseTransport::accept_responder(stream, responder_static(), secret(0x22))
        .expect("responder handshake succeeds")
}

fn initiator_config() -> SessionConfig {
    let mut config = SessionConfig::initiator(initiator_static(), responder_pubkey());
    config.reconnect_timeout = Duration::ZERO;
    config
}

// ----- tests -----

#[test]
fn session_reaches_ready_and_answers_ping() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");

        let first = transport.read().expect("initiator init");
        let Message::Init(init) = Message::decode(&first).expect("decodes") else {
            panic!("first frame was not init");
        };
        assert_eq!(init.features, [0x02]);

        transport
            .write(&Message::Ping(Ping::new(2)).encode())
            .expect("ping write");

        // The mandatory reply: exactly two zero bytes.
        let pong = transport.read().expect("pong");
        assert_eq!(pong, [0x00, 0x13, 0x00, 0x02, 0x00, 0x00]);

        transport.end().expect("shutdown");
    });

    let mut config = initiator_config();
    config.features = vec![0x02];
    let mut session = PeerSession::new(config, Accepted::new(local));
    session.connect().expect("connect succeeds");
    assert_eq!(session.state(), PeerState::AwaitingPeerInit);

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(matches!(&events[0], SessionEvent::Sending(bytes) if bytes[..2] == [0x00, 0x10]));
    assert!(matches!(events[1], SessionEvent::Ready));
    assert!(matches!(&events[2], SessionEvent::Sending(bytes) if bytes[..2] == [0x00, 0x13]));
    assert!(
        matches!(&events[3], SessionEvent::Message(Message::Ping(ping)) if ping.num_pong_bytes == 2)
    );
    assert!(matches!(events[4], SessionEvent::Close));
    assert_eq!(events.len(), 5);

    assert_eq!(session.state(), PeerState::Disconnected);
    assert_eq!(session.remote_init(), Some(&Init::empty()));
}

#[test]
fn first_frame_must_be_init() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Ping(Ping::new(1)).encode())
            .expect("ping write");
        // Drain whatever the session sent before it noticed.
        let _ = transport.read();
    });

    let mut session = PeerSession::new(initiator_config(), Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(matches!(&events[0], SessionEvent::Sending(_)));
    assert!(matches!(
        &events[1],
        SessionEvent::Error(SessionError::UnexpectedMessage(18))
    ));
    assert!(matches!(events[2], SessionEvent::Close));
    assert_eq!(session.state(), PeerState::Disconnected);
}

#[test]
fn unknown_required_feature_is_fatal() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        // Bit 0 is even: required. We advertise nothing.
        transport
            .write(&Message::Init(Init::with_features(Vec::new(), vec![0x01])).encode())
            .expect("init write");
        let _ = transport.read();
    });

    let mut session = PeerSession::new(initiator_config(), Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(matches!(
        &events[1],
        SessionEvent::Error(SessionError::UnknownRequiredFeature(0))
    ));
    assert!(matches!(events[2], SessionEvent::Close));
}

#[test]
fn odd_feature_bits_are_tolerated() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        // Bit 1 is odd: optional, fine to not know it.
        transport
            .write(&Message::Init(Init::with_features(Vec::new(), vec![0x02])).encode())
            .expect("init write");
        let _ = transport.read();
        transport.end().expect("shutdown");
    });

    let mut session = PeerSession::new(initiator_config(), Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut saw_ready = false;
    while let Some(event) = session.next_event() {
        if matches!(event, SessionEvent::Ready) {
            saw_ready = true;
        }
        assert!(!matches!(event, SessionEvent::Error(_)), "unexpected error");
    }
    peer.join().expect("peer thread clean");
    assert!(saw_ready);
}

#[test]
fn truncated_init_is_malformed() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        // Type says init, but the gflen field is cut short.
        transport.write(&[0x00, 0x10, 0x00]).expect("write");
        let _ = transport.read();
    });

    let mut session = PeerSession::new(initiator_config(), Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(matches!(
        &events[1],
        SessionEvent::Error(SessionError::MalformedInit(_))
    ));
}

#[test]
fn unsolicited_pong_is_fatal() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");
        transport
            .write(&Message::Pong(Pong::new(1)).encode())
            .expect("pong write");
        let _ = transport.read();
    });

    let mut session = PeerSession::new(initiator_config(), Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Error(SessionError::PongUnsolicited)
    )));
    assert_eq!(session.state(), PeerState::Disconnected);
}

#[test]
fn missed_ping_times_out() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");
        // Swallow pings until the session gives up and closes.
        while transport.read().is_ok() {}
    });

    let mut config = initiator_config();
    config.ping_interval = Duration::from_millis(20);
    config.ping_timeout = Duration::from_millis(20);
    let mut session = PeerSession::new(config, Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    // init out, ready, ping out, then the timeout.
    assert!(matches!(&events[2], SessionEvent::Sending(bytes) if bytes[..2] == [0x00, 0x12]));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(SessionError::PingTimeout)))
    );
}

#[test]
fn answered_ping_keeps_session_alive() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");

        // Answer two liveness probes, then hang up.
        for _ in 0..2 {
            let frame = transport.read().expect("ping");
            let Message::Ping(ping) = Message::decode(&frame).expect("decodes") else {
                panic!("expected ping");
            };
            transport
                .write(&Message::Pong(Pong::respond_to(&ping)).encode())
                .expect("pong write");
        }
        transport.end().expect("shutdown");
    });

    let mut config = initiator_config();
    config.ping_interval = Duration::from_millis(20);
    config.ping_timeout = Duration::from_millis(60);
    let mut session = PeerSession::new(config, Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(
        !events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(_))),
        "liveness should have stayed clean"
    );
    let pongs = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Message(Message::Pong(_))))
        .count();
    assert_eq!(pongs, 2);
}

#[test]
fn remote_error_closes_without_reconnect() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = raw_responder(remote);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");
        let goodbye = ErrorMsg::all_channels("go away").expect("short message fits");
        transport
            .write(&Message::Error(goodbye).encode())
            .expect("error write");
        let _ = transport.read();
    });

    // Reconnects enabled, but a peer error must not trigger one.
    let mut config = initiator_config();
    config.reconnect_timeout = Duration::from_millis(10);
    let mut session = PeerSession::new(config, Accepted::new(local));
    session.connect().expect("connect succeeds");

    let mut events = Vec::new();
    while let Some(event) = session.next_event() {
        events.push(event);
    }
    peer.join().expect("peer thread clean");

    assert!(matches!(
        &events[2],
        SessionEvent::Message(Message::Error(e)) if e.message() == Some("go away")
    ));
    assert!(matches!(events[3], SessionEvent::Close));
    assert!(!session.reconnect_scheduled());
    assert_eq!(session.state(), PeerState::Disconnected);
}

#[test]
fn unsolicited_close_reconnects_with_fresh_handshake() {
    let (local_a, remote_a) = pipe();
    let (local_b, remote_b) = pipe();

    let peer = thread::spawn(move || {
        // First connection: complete bring-up, then hang up.
        let mut transport = raw_responder(remote_a);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");
        transport.end().expect("shutdown");

        // Second connection: a brand new handshake must succeed.
        let mut transport = raw_responder(remote_b);
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("initiator init");
        // Wait for the initiator to hang up this time.
        while transport.read().is_ok() {}
    });

    let mut config = initiator_config();
    config.reconnect_timeout = Duration::from_millis(10);
    let connector = QueueConnector {
        streams: VecDeque::from([local_a, local_b]),
    };
    let mut session = PeerSession::new(config, connector);
    session.connect().expect("connect succeeds");

    // First connection: init out, ready, close.
    assert!(matches!(session.next_event(), Some(SessionEvent::Sending(_))));
    assert!(matches!(session.next_event(), Some(SessionEvent::Ready)));
    assert!(matches!(session.next_event(), Some(SessionEvent::Close)));
    assert_eq!(session.state(), PeerState::Pending);
    assert!(session.reconnect_scheduled());

    // The next poll sleeps out the delay and redials.
    assert!(matches!(session.next_event(), Some(SessionEvent::Sending(_))));
    assert!(matches!(session.next_event(), Some(SessionEvent::Ready)));
    assert_eq!(session.state(), PeerState::Ready);

    session.disconnect();
    assert!(matches!(session.next_event(), Some(SessionEvent::Close)));
    assert!(session.next_event().is_none());
    peer.join().expect("peer thread clean");
}

#[test]
fn responder_session_accepts_and_pins() {
    // An accepting session with the right pin reaches ready.
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        let mut transport = NoiseTransport::connect_initiator(
            remote,
            initiator_static(),
            secret(0x12),
            responder_pubkey(),
        )
        .expect("initiator handshake");
        transport
            .write(&Message::Init(Init::empty()).encode())
            .expect("init write");
        let _ = transport.read().expect("responder init");
        transport.end().expect("shutdown");
    });

    let initiator_pub = PublicKey::from_secret_key(&Secp256k1::new(), &initiator_static());
    let mut config = SessionConfig::responder(responder_static());
    config.remote_static_pubkey = Some(initiator_pub);
    let mut session = PeerSession::new(config, Accepted::new(local));
    session.connect().expect("pinned key matches");

    let mut saw_ready = false;
    while let Some(event) = session.next_event() {
        if matches!(event, SessionEvent::Ready) {
            saw_ready = true;
        }
    }
    peer.join().expect("peer thread clean");
    assert!(saw_ready);
    // Responders never reconnect.
    assert!(!session.reconnect_scheduled());
}

#[test]
fn responder_session_rejects_wrong_pin() {
    let (local, remote) = pipe();

    let peer = thread::spawn(move || {
        // The initiator is 0x11..., but the responder pins a different key.
        let result = NoiseTransport::connect_initiator(
            remote,
            initiator_static(),
            secret(0x12),
            responder_pubkey(),
        );
        // The handshake itself completes; the rejection is the session's.
        if let Ok(mut transport) = result {
            let _ = transport.read();
        }
    });

    let other_pub = PublicKey::from_secret_key(&Secp256k1::new(), &secret(0x33));
    let mut config = SessionConfig::responder(responder_static());
    config.remote_static_pubkey = Some(other_pub);
    let mut session = PeerSession::new(config, Accepted::new(local));

    assert!(matches!(
        session.connect(),
        Err(SessionError::RemoteKeyMismatch)
    ));
    peer.join().expect("peer thread clean");
}

// ----- TCP end-to-end -----

use std::net::{TcpListener, TcpStream};

#[test]
fn sessions_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener bind successful");
    let addr = listener.local_addr().expect("bound address");

    let responder = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("connection accepted");
        let mut config = SessionConfig::responder(responder_static());
        config.reconnect_timeout = Duration::ZERO;
        let mut session = PeerSession::new(config, Accepted::new(stream));
        session.connect().expect("responder connect");

        while let Some(event) = session.next_event() {
            match event {
                SessionEvent::Message(Message::Unknown { msg_type: 101, payload }) => {
                    let reply: Vec<u8> = payload.iter().rev().copied().collect();
                    session
                        .send(&Message::Unknown {
                            msg_type: 103,
                            payload: reply,
                        })
                        .expect("reply send");
                }
                SessionEvent::Error(e) => panic!("responder error: {e}"),
                _ => {}
            }
        }
    });

    let stream = TcpStream::connect(addr).expect("connect successful");
    let mut session = PeerSession::new(initiator_config(), Accepted::new(stream));
    session.connect().expect("initiator connect");

    // Drive to ready.
    loop {
        match session.next_event().expect("session alive") {
            SessionEvent::Ready => break,
            SessionEvent::Error(e) => panic!("initiator error: {e}"),
            _ => {}
        }
    }

    session
        .send(&Message::Unknown {
            msg_type: 101,
            payload: b"hello".to_vec(),
        })
        .expect("send succeeds");

    // Await the reversed echo.
    loop {
        match session.next_event().expect("session alive") {
            SessionEvent::Message(Message::Unknown { msg_type: 103, payload }) => {
                assert_eq!(payload, b"olleh");
                break;
            }
            SessionEvent::Error(e) => panic!("initiator error: {e}"),
            _ => {}
        }
    }

    session.disconnect();
    while session.next_event().is_some() {}
    responder.join().expect("responder thread clean");
}
