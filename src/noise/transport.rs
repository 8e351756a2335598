//! Encrypted duplex channel for Lightning Network peers.
//!
//! Wraps a byte-oriented stream and provides framed, encrypted message
//! exchange using the BOLT 8 Noise protocol: a three-act handshake followed
//! by length-framed AEAD traffic with per-direction key rotation.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use secp256k1::{PublicKey, SecretKey};

use super::cipher::{CipherState, MAX_MESSAGE_SIZE};
use super::error::NoiseError;
use super::frame::{FrameBuffer, ReadState, seal_frame};
use super::handshake::{ACT_ONE_SIZE, ACT_THREE_SIZE, ACT_TWO_SIZE, NoiseHandshake};

/// Bytes requested from the stream per read.
const READ_CHUNK: usize = 4096;

/// Byte-oriented duplex stream carrying an encrypted session.
///
/// The transport treats the bearer as an opaque pipe: it never inspects
/// addresses or transport-level framing, only reads and writes bytes.
pub trait Bearer: Read + Write {
    /// Bounds how long a single read may block; `None` blocks indefinitely.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Closes both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Bearer for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // Already torn down by the peer; nothing left to close.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// A Noise-encrypted connection to a Lightning Network peer.
///
/// Owns the stream and both cipher states for the lifetime of the
/// connection. Any decryption failure poisons the transport: no further read
/// or write can succeed, because the nonce counters cannot be rewound.
pub struct NoiseTransport<S: Bearer> {
    stream: S,
    send: CipherState,
    recv: CipherState,
    frames: FrameBuffer,
    remote_static: PublicKey,
    poisoned: bool,
}

impl<S: Bearer> NoiseTransport<S> {
    /// Connects as initiator: sends acts one and three, awaits act two.
    ///
    /// `remote_static` is the responder's known static public key (its node
    /// id); `local_ephemeral` must be fresh for this attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails, the stream closes mid-act, or the
    /// handshake is rejected cryptographically.
    pub fn connect_initiator(
        mut stream: S,
        local_static: SecretKey,
        local_ephemeral: SecretKey,
        remote_static: PublicKey,
    ) -> Result<Self, TransportError> {
        let mut frames = FrameBuffer::new();
        frames.begin_handshake();

        let mut handshake =
            NoiseHandshake::new_initiator(local_static, local_ephemeral, remote_static);

        let act_one = handshake.get_act_one()?;
        stream.write_all(&act_one)?;

        let act_two: [u8; ACT_TWO_SIZE] = read_act(&mut stream, &mut frames, ACT_TWO_SIZE)?
            .try_into()
            .expect("read_act returns exactly the requested length");
        let act_three = handshake.process_act_two(&act_two)?;
        stream.write_all(&act_three)?;

        let (send, recv) = handshake.into_cipher_states()?;
        frames.handshake_complete();
        log::debug!("initiator handshake complete, peer {remote_static}");

        Ok(Self {
            stream,
            send,
            recv,
            frames,
            remote_static,
            poisoned: false,
        })
    }

    /// Accepts as responder: awaits act one, sends act two, awaits act three.
    ///
    /// The initiator's static key is learned from act three and exposed via
    /// [`remote_static`](Self::remote_static).
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails, the stream closes mid-act, or the
    /// handshake is rejected cryptographically.
    pub fn accept_responder(
        mut stream: S,
        local_static: SecretKey,
        local_ephemeral: SecretKey,
    ) -> Result<Self, TransportError> {
        let mut frames = FrameBuffer::new();
        frames.begin_handshake();

        let mut handshake = NoiseHandshake::new_responder(local_static, local_ephemeral);

        let act_one: [u8; ACT_ONE_SIZE] = read_act(&mut stream, &mut frames, ACT_ONE_SIZE)?
            .try_into()
            .expect("read_act returns exactly the requested length");
        let act_two = handshake.process_act_one(&act_one)?;
        stream.write_all(&act_two)?;

        let act_three: [u8; ACT_THREE_SIZE] = read_act(&mut stream, &mut frames, ACT_THREE_SIZE)?
            .try_into()
            .expect("read_act returns exactly the requested length");
        let remote_static = handshake.process_act_three(&act_three)?;

        let (send, recv) = handshake.into_cipher_states()?;
        frames.handshake_complete();
        log::debug!("responder handshake complete, peer {remote_static}");

        Ok(Self {
            stream,
            send,
            recv,
            frames,
            remote_static,
            poisoned: false,
        })
    }

    /// The peer's static public key.
    #[must_use]
    pub fn remote_static(&self) -> PublicKey {
        self.remote_static
    }

    /// Read-side framing state.
    #[must_use]
    pub fn read_state(&self) -> ReadState {
        self.frames.state()
    }

    /// Send-direction nonce counter.
    #[must_use]
    pub fn send_nonce(&self) -> u64 {
        self.send.nonce()
    }

    /// Receive-direction nonce counter.
    #[must_use]
    pub fn recv_nonce(&self) -> u64 {
        self.recv.nonce()
    }

    /// Encrypts and writes one frame.
    ///
    /// The frame (length header and body, two AEAD operations) is produced
    /// atomically and written whole.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLarge` above 65535 bytes, `Poisoned` after an
    /// earlier decryption failure, or an IO error from the stream.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge(payload.len()));
        }

        let frame = seal_frame(&mut self.send, payload);
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Attempts to read one decrypted payload.
    ///
    /// Returns `Ok(None)` if the stream's read timeout expires first. Frames
    /// are delivered in strict wire order; when the internal inbox reaches
    /// its watermark, ingestion pauses until the backlog is drained through
    /// this method.
    ///
    /// # Errors
    ///
    /// Returns `Closed` on clean EOF, a Noise error on decryption failure
    /// (poisoning the transport), or an IO error from the stream.
    pub fn poll_read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }

        // Decode anything already buffered, including bytes that rode in on
        // the same reads as the final handshake act.
        let processed = self.frames.process(&mut self.recv);
        self.check(processed)?;
        let pending = self.frames.next_frame(&mut self.recv);
        if let Some(frame) = self.check(pending)? {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = match self.stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(TransportError::Closed);
        }

        self.frames.extend(&chunk[..n]);
        let processed = self.frames.process(&mut self.recv);
        self.check(processed)?;
        let next = self.frames.next_frame(&mut self.recv);
        self.check(next)
    }

    /// Reads one decrypted payload, blocking until a full frame arrives.
    ///
    /// # Errors
    ///
    /// Same conditions as [`poll_read`](Self::poll_read), minus the timeout.
    pub fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(payload) = self.poll_read()? {
                return Ok(payload);
            }
        }
    }

    /// Bounds how long [`poll_read`](Self::poll_read) may block.
    ///
    /// # Errors
    ///
    /// Returns an error if the bearer rejects the timeout.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Closes the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown itself fails.
    pub fn end(&mut self) -> io::Result<()> {
        self.stream.shutdown()
    }

    /// Converts a framing result, wiping keys on decryption failure.
    fn check<T>(&mut self, result: Result<T, NoiseError>) -> Result<T, TransportError> {
        result.map_err(|e| {
            self.poisoned = true;
            self.send.wipe();
            self.recv.wipe();
            log::warn!("transport poisoned: {e}");
            TransportError::Noise(e)
        })
    }
}

/// Accumulates stream bytes until a full `len`-byte handshake act is
/// buffered. Acts may arrive at any fragmentation.
fn read_act<S: Bearer>(
    stream: &mut S,
    frames: &mut FrameBuffer,
    len: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(act) = frames.take_act(len) {
            return Ok(act);
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(TransportError::ShortHandshakeRead {
                expected: len,
                actual: frames.buffered(),
            });
        }
        frames.extend(&chunk[..n]);
    }
}

/// Errors from transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// IO error from the underlying stream.
    Io(io::Error),
    /// Noise protocol error (handshake or decryption).
    Noise(NoiseError),
    /// Payload exceeds the 65535-byte frame limit.
    MessageTooLarge(usize),
    /// Stream closed before a full handshake act arrived.
    ShortHandshakeRead { expected: usize, actual: usize },
    /// Stream closed cleanly by the peer.
    Closed,
    /// An earlier decryption failure made the channel unusable.
    Poisoned,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Noise(e) => write!(f, "Noise error: {e}"),
            Self::MessageTooLarge(size) => {
                write!(f, "message too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            }
            Self::ShortHandshakeRead { expected, actual } => {
                write!(f, "stream closed mid-handshake: got {actual} of {expected} bytes")
            }
            Self::Closed => write!(f, "stream closed"),
            Self::Poisoned => write!(f, "transport poisoned by earlier decryption failure"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Noise(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<NoiseError> for TransportError {
    fn from(e: NoiseError) -> Self {
        Self::Noise(e)
    }
}
