//! BOLT 8 Noise protocol implementation for Lightning Network transport.
//!
//! This module implements the `Noise_XK` handshake pattern used by Lightning
//! nodes and the framed, key-rotating message stream that follows it.

mod cipher;
mod error;
mod frame;
mod handshake;
mod transport;

pub use cipher::{
    CipherState, ENCRYPTED_LENGTH_SIZE, KEY_ROTATION_INTERVAL, MAC_SIZE, MAX_MESSAGE_SIZE,
};
pub use error::NoiseError;
pub use frame::{FRAME_BACKLOG, FrameBuffer, ReadState};
pub use handshake::{ACT_ONE_SIZE, ACT_THREE_SIZE, ACT_TWO_SIZE, NoiseHandshake};
pub use transport::{Bearer, NoiseTransport, TransportError};
