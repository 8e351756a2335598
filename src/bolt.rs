//! BOLT 1 message encoding and decoding.
//!
//! Wire messages are a 2-byte big-endian type followed by a type-specific
//! payload. The peer session only interprets the BOLT 1 set defined here;
//! everything else rides through as an opaque [`Message::Unknown`]. The ping
//! and pong codecs live in this file because they are two-field wire shapes
//! with no state of their own; init and the error/warning pair have modules.

mod init;
mod notice;
mod wire;

pub use init::{Init, InitTlvs};
pub use notice::{Error, Warning};
pub use wire::{
    CHANNEL_ID_SIZE, ChannelId, MAX_MESSAGE_SIZE, Reader, put_bigsize, put_u16_prefixed,
};

/// Errors that can occur during BOLT message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoltError {
    // General decoding errors
    /// Not enough bytes to decode (message or field truncated)
    Truncated { expected: usize, actual: usize },
    /// Unknown even message type (must close connection per BOLT 1)
    UnknownEvenType(u16),
    /// Message body exceeds its u16 length prefix
    MessageTooLong(usize),

    // BigSize errors
    /// `BigSize` not minimally encoded
    BigSizeNotMinimal,
    /// `BigSize` truncated (unexpected EOF)
    BigSizeTruncated,

    // TLV errors
    /// TLV type not in strictly increasing order
    TlvNotIncreasing { previous: u64, current: u64 },
    /// TLV length exceeds remaining bytes
    TlvLengthOverflow,
    /// Unknown even TLV type (must reject per BOLT 1)
    TlvUnknownEvenType(u64),
}

impl std::fmt::Display for BoltError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { expected, actual } => {
                write!(f, "TRUNCATED expected {expected} got {actual}")
            }
            Self::UnknownEvenType(t) => write!(f, "UNKNOWN_EVEN_TYPE {t}"),
            Self::MessageTooLong(len) => write!(f, "MESSAGE_TOO_LONG {len}"),
            Self::BigSizeNotMinimal => write!(f, "BIGSIZE_NOT_MINIMAL"),
            Self::BigSizeTruncated => write!(f, "BIGSIZE_TRUNCATED"),
            Self::TlvNotIncreasing { previous, current } => {
                write!(
                    f,
                    "TLV_NOT_INCREASING previous {previous} current {current}"
                )
            }
            Self::TlvLengthOverflow => write!(f, "TLV_LENGTH_OVERFLOW"),
            Self::TlvUnknownEvenType(t) => write!(f, "TLV_UNKNOWN_EVEN_TYPE {t}"),
        }
    }
}

impl std::error::Error for BoltError {}

/// BOLT message type constants.
pub mod msg_type {
    /// Warning message (BOLT 1).
    pub const WARNING: u16 = 1;
    /// Init message (BOLT 1).
    pub const INIT: u16 = 16;
    /// Error message (BOLT 1).
    pub const ERROR: u16 = 17;
    /// Ping message (BOLT 1).
    pub const PING: u16 = 18;
    /// Pong message (BOLT 1).
    pub const PONG: u16 = 19;
}

/// BOLT 1 ping message (type 18).
///
/// Sent periodically by the session's liveness layer; `num_pong_bytes` sets
/// the exact size of the required reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    /// Number of bytes the peer should respond with in pong.
    pub num_pong_bytes: u16,
    /// Padding bytes (ignored by receiver).
    pub ignored: Vec<u8>,
}

impl Ping {
    /// Creates a ping requesting `num_pong_bytes` in the pong response.
    #[must_use]
    pub fn new(num_pong_bytes: u16) -> Self {
        Self {
            num_pong_bytes,
            ignored: Vec::new(),
        }
    }

    /// Encodes to wire format (without message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.ignored.len());
        out.extend_from_slice(&self.num_pong_bytes.to_be_bytes());
        put_u16_prefixed(&mut out, &self.ignored);
        out
    }

    /// Decodes from wire format (without message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the payload is too short.
    pub fn decode(payload: &[u8]) -> Result<Self, BoltError> {
        let mut r = Reader::new(payload);
        let num_pong_bytes = r.u16()?;
        let ignored = r.u16_prefixed()?.to_vec();
        // Trailing bytes tolerated (future TLV extension).
        Ok(Self {
            num_pong_bytes,
            ignored,
        })
    }
}

/// BOLT 1 pong message (type 19).
///
/// The reply half of the liveness exchange; its padding length must equal
/// the eliciting ping's `num_pong_bytes` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    /// Padding bytes (should match ping's `num_pong_bytes`).
    pub ignored: Vec<u8>,
}

impl Pong {
    /// Creates a pong carrying `byteslen` zero bytes.
    #[must_use]
    pub fn new(byteslen: u16) -> Self {
        Self {
            ignored: vec![0u8; usize::from(byteslen)],
        }
    }

    /// Creates the reply a ping asks for.
    #[must_use]
    pub fn respond_to(ping: &Ping) -> Self {
        Self::new(ping.num_pong_bytes)
    }

    /// Encodes to wire format (without message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.ignored.len());
        put_u16_prefixed(&mut out, &self.ignored);
        out
    }

    /// Decodes from wire format (without message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the payload is too short.
    pub fn decode(payload: &[u8]) -> Result<Self, BoltError> {
        let mut r = Reader::new(payload);
        let ignored = r.u16_prefixed()?.to_vec();
        Ok(Self { ignored })
    }
}

/// A decoded BOLT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Warning message (type 1).
    Warning(Warning),
    /// Init message (type 16).
    Init(Init),
    /// Error message (type 17).
    Error(Error),
    /// Ping message (type 18).
    Ping(Ping),
    /// Pong message (type 19).
    Pong(Pong),
    /// A message type this layer does not interpret.
    ///
    /// Odd unknown types are legal and carried opaquely; even unknown types
    /// never reach this variant because decoding rejects them.
    Unknown {
        /// The message type.
        msg_type: u16,
        /// The raw payload (without type prefix).
        payload: Vec<u8>,
    },
}

impl Message {
    /// Returns the message type number.
    #[must_use]
    pub fn msg_type(&self) -> u16 {
        match self {
            Self::Warning(_) => msg_type::WARNING,
            Self::Init(_) => msg_type::INIT,
            Self::Error(_) => msg_type::ERROR,
            Self::Ping(_) => msg_type::PING,
            Self::Pong(_) => msg_type::PONG,
            Self::Unknown { msg_type, .. } => *msg_type,
        }
    }

    /// Encodes to wire format (with 2-byte message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.msg_type().to_be_bytes());
        match self {
            Self::Warning(m) => out.extend(m.encode()),
            Self::Init(m) => out.extend(m.encode()),
            Self::Error(m) => out.extend(m.encode()),
            Self::Ping(m) => out.extend(m.encode()),
            Self::Pong(m) => out.extend(m.encode()),
            Self::Unknown { payload, .. } => out.extend(payload),
        }
        out
    }

    /// Decodes from wire format (with 2-byte message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the message is too short, `UnknownEvenType` if
    /// the message type is an unknown even number, or a decode error from the
    /// specific message type.
    pub fn decode(data: &[u8]) -> Result<Self, BoltError> {
        let mut r = Reader::new(data);
        let msg_type = r.u16()?;
        let payload = r.rest();

        match msg_type {
            msg_type::WARNING => Ok(Self::Warning(Warning::decode(payload)?)),
            msg_type::INIT => Ok(Self::Init(Init::decode(payload)?)),
            msg_type::ERROR => Ok(Self::Error(Error::decode(payload)?)),
            msg_type::PING => Ok(Self::Ping(Ping::decode(payload)?)),
            msg_type::PONG => Ok(Self::Pong(Pong::decode(payload)?)),
            _ => {
                // Unknown even types must be rejected per BOLT 1
                if msg_type % 2 == 0 {
                    Err(BoltError::UnknownEvenType(msg_type))
                } else {
                    Ok(Self::Unknown {
                        msg_type,
                        payload: payload.to_vec(),
                    })
                }
            }
        }
    }
}
