//! BOLT 1 error and warning messages.
//!
//! Both share one wire shape: a channel ID and a length-prefixed
//! human-readable body. They differ only in severity: an error ends the
//! session, a warning is logged and carried on.

use super::BoltError;
use super::wire::{ChannelId, MAX_MESSAGE_SIZE, Reader, put_u16_prefixed};

/// BOLT 1 error message (type 17).
///
/// Indicates a fatal protocol violation. The receiver fails the referenced
/// channel, or the whole connection if `channel_id` is all zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Channel this error applies to (all zeros = all channels).
    pub channel_id: ChannelId,
    /// Human-readable error description.
    ///
    /// Per BOLT 1 this should be printable ASCII (bytes 32-126); arbitrary
    /// bytes are carried as-is and [`message`](Self::message) returns `None`
    /// for non-UTF-8 data.
    pub data: Vec<u8>,
}

/// BOLT 1 warning message (type 1).
///
/// Indicates a recoverable protocol complaint. The receiver should log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Channel this warning applies to (all zeros = not channel-specific).
    pub channel_id: ChannelId,
    /// Human-readable warning description, same conventions as
    /// [`Error::data`].
    pub data: Vec<u8>,
}

impl Error {
    /// Creates an error that applies to all channels.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLong` if `msg` exceeds the length prefix's range.
    pub fn all_channels(msg: &str) -> Result<Self, BoltError> {
        Self::for_channel(ChannelId::ALL, msg)
    }

    /// Creates an error for a specific channel.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLong` if `msg` exceeds the length prefix's range.
    pub fn for_channel(channel_id: ChannelId, msg: &str) -> Result<Self, BoltError> {
        Ok(Self {
            channel_id,
            data: checked_body(msg)?,
        })
    }

    /// Encodes to wire format (without message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_notice(self.channel_id, &self.data)
    }

    /// Decodes from wire format (without message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the payload is too short.
    pub fn decode(payload: &[u8]) -> Result<Self, BoltError> {
        let (channel_id, data) = decode_notice(payload)?;
        Ok(Self { channel_id, data })
    }

    /// Returns the body as a string if it is valid UTF-8.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl Warning {
    /// Creates a warning not tied to a specific channel.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLong` if `msg` exceeds the length prefix's range.
    pub fn all_channels(msg: &str) -> Result<Self, BoltError> {
        Self::for_channel(ChannelId::ALL, msg)
    }

    /// Creates a warning for a specific channel.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLong` if `msg` exceeds the length prefix's range.
    pub fn for_channel(channel_id: ChannelId, msg: &str) -> Result<Self, BoltError> {
        Ok(Self {
            channel_id,
            data: checked_body(msg)?,
        })
    }

    /// Encodes to wire format (without message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode_notice(self.channel_id, &self.data)
    }

    /// Decodes from wire format (without message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the payload is too short.
    pub fn decode(payload: &[u8]) -> Result<Self, BoltError> {
        let (channel_id, data) = decode_notice(payload)?;
        Ok(Self { channel_id, data })
    }

    /// Returns the body as a string if it is valid UTF-8.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

fn checked_body(msg: &str) -> Result<Vec<u8>, BoltError> {
    if msg.len() > MAX_MESSAGE_SIZE {
        return Err(BoltError::MessageTooLong(msg.len()));
    }
    Ok(msg.as_bytes().to_vec())
}

fn encode_notice(channel_id: ChannelId, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 34);
    channel_id.write(&mut out);
    put_u16_prefixed(&mut out, data);
    out
}

fn decode_notice(payload: &[u8]) -> Result<(ChannelId, Vec<u8>), BoltError> {
    let mut r = Reader::new(payload);
    let channel_id = ChannelId::read(&mut r)?;
    let data = r.u16_prefixed()?.to_vec();
    // Trailing bytes tolerated (future TLV extension).
    Ok((channel_id, data))
}
