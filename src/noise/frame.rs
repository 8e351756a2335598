//! Inbound framing state machine and frame sealing.
//!
//! Post-handshake traffic is length-framed: an 18-byte encrypted length
//! header followed by the encrypted body and its tag. The header and the body
//! are separate AEAD operations, so a frame costs two nonces per direction.
//!
//! The framer is deliberately I/O-free: the transport feeds it whatever bytes
//! the stream produced, at any fragmentation, and drains decoded payloads
//! from a bounded inbox.

use std::collections::VecDeque;

use super::cipher::{CipherState, ENCRYPTED_LENGTH_SIZE, MAC_SIZE, MAX_MESSAGE_SIZE};
use super::error::NoiseError;

/// Decoded frames held for the consumer before ingestion blocks.
pub const FRAME_BACKLOG: usize = 16;

/// Read-side state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Created; the handshake has not started.
    Pending,
    /// Awaiting a fixed-size handshake act from the peer.
    AwaitingHandshakeReply,
    /// Awaiting the 18-byte encrypted length header.
    ReadyForLen,
    /// Length decrypted; awaiting the frame body.
    ReadyForBody,
    /// Inbox full; ingestion suspended until the consumer drains a frame.
    Blocked,
}

/// Inbound byte accumulator and framing state machine.
pub struct FrameBuffer {
    state: ReadState,
    buf: Vec<u8>,
    /// Body length of the in-flight frame. The header's nonce is consumed the
    /// moment it is decrypted, so the value lives here until the body
    /// arrives; the header bytes are gone and must never be decrypted twice.
    pending_len: Option<u16>,
    inbox: VecDeque<Vec<u8>>,
}

impl FrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReadState::Pending,
            buf: Vec::new(),
            pending_len: None,
            inbox: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Cached body length, `Some` exactly while in [`ReadState::ReadyForBody`].
    #[must_use]
    pub fn pending_len(&self) -> Option<u16> {
        self.pending_len
    }

    /// Bytes buffered but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Marks the handshake as started; acts are awaited from now on.
    pub fn begin_handshake(&mut self) {
        self.state = ReadState::AwaitingHandshakeReply;
    }

    /// Marks the handshake as finished; frames are awaited from now on.
    pub fn handshake_complete(&mut self) {
        self.state = ReadState::ReadyForLen;
    }

    /// Appends raw bytes from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes a full handshake act of `len` bytes, if buffered.
    pub fn take_act(&mut self, len: usize) -> Option<Vec<u8>> {
        if self.state != ReadState::AwaitingHandshakeReply || self.buf.len() < len {
            return None;
        }
        Some(self.buf.drain(..len).collect())
    }

    /// Decodes as many buffered frames as possible into the inbox.
    ///
    /// Stops early when fewer bytes than the next step needs are buffered
    /// (without touching the cipher state) or when the inbox reaches
    /// [`FRAME_BACKLOG`] (entering [`ReadState::Blocked`]).
    ///
    /// # Errors
    ///
    /// Returns [`NoiseError::FrameBadTag`] if either AEAD operation fails;
    /// the buffer is unusable afterwards.
    pub fn process(&mut self, recv: &mut CipherState) -> Result<(), NoiseError> {
        loop {
            match self.state {
                ReadState::ReadyForLen => {
                    if self.buf.len() < ENCRYPTED_LENGTH_SIZE {
                        return Ok(());
                    }
                    let header: Vec<u8> = self.buf.drain(..ENCRYPTED_LENGTH_SIZE).collect();
                    let plain = recv.decrypt(&[], &header)?;
                    self.pending_len = Some(u16::from_be_bytes([plain[0], plain[1]]));
                    self.state = ReadState::ReadyForBody;
                }
                ReadState::ReadyForBody => {
                    let len = usize::from(self.pending_len.expect("cached with the state change"));
                    if self.buf.len() < len + MAC_SIZE {
                        return Ok(());
                    }
                    let body: Vec<u8> = self.buf.drain(..len + MAC_SIZE).collect();
                    let plain = recv.decrypt(&[], &body)?;
                    self.pending_len = None;
                    self.inbox.push_back(plain);
                    self.state = if self.inbox.len() >= FRAME_BACKLOG {
                        ReadState::Blocked
                    } else {
                        ReadState::ReadyForLen
                    };
                }
                _ => return Ok(()),
            }
        }
    }

    /// Pops the next decoded payload, resuming ingestion if it was blocked.
    ///
    /// # Errors
    ///
    /// Returns [`NoiseError::FrameBadTag`] if resumed processing hits a bad
    /// frame.
    pub fn next_frame(&mut self, recv: &mut CipherState) -> Result<Option<Vec<u8>>, NoiseError> {
        let frame = self.inbox.pop_front();
        if frame.is_some() && self.state == ReadState::Blocked && self.inbox.len() < FRAME_BACKLOG {
            self.state = ReadState::ReadyForLen;
            self.process(recv)?;
        }
        Ok(frame)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encrypts one payload into a wire frame: length header then body.
///
/// Both AEAD operations happen back to back; the frame is produced as one
/// unit so a partial frame can never reach the stream.
pub(crate) fn seal_frame(send: &mut CipherState, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_MESSAGE_SIZE);
    #[allow(clippy::cast_possible_truncation)] // length checked by the caller
    let len = (payload.len() as u16).to_be_bytes();
    let mut frame = send.encrypt(&[], &len);
    frame.extend_from_slice(&send.encrypt(&[], payload));
    frame
}
