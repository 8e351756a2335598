//! Wire primitives: a borrowing payload reader, `BigSize` varints, and
//! channel identifiers.
//!
//! Every decoder in this module tree reads through a [`Reader`]; a short
//! payload surfaces as [`BoltError::Truncated`] with the missing count, and
//! nothing is consumed past the failure point.

use super::BoltError;

/// Maximum Lightning message size (2-byte length prefix limit).
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// Size of a channel ID in bytes.
pub const CHANNEL_ID_SIZE: usize = 32;

/// Borrowing cursor over a message payload.
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], BoltError> {
        if self.data.len() < n {
            return Err(BoltError::Truncated {
                expected: n,
                actual: self.data.len(),
            });
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    /// Consumes a big-endian u16.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if fewer than 2 bytes remain.
    pub fn u16(&mut self) -> Result<u16, BoltError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Consumes a length-prefixed byte string (`u16 len || bytes`).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the prefix or the body is cut short.
    pub fn u16_prefixed(&mut self) -> Result<&'a [u8], BoltError> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    /// Consumes everything left in the payload.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    /// Consumes a `BigSize` varint, rejecting non-minimal encodings.
    ///
    /// `BigSize` is like Bitcoin's `CompactSize` but big-endian:
    /// one byte up to 0xfc, then 0xfd/0xfe/0xff tags for 2/4/8-byte values.
    ///
    /// # Errors
    ///
    /// Returns `BigSizeTruncated` on a short read or `BigSizeNotMinimal`
    /// when a value is encoded wider than necessary.
    pub fn bigsize(&mut self) -> Result<u64, BoltError> {
        let tag = self.take(1).map_err(|_| BoltError::BigSizeTruncated)?[0];
        match tag {
            0..=0xfc => Ok(u64::from(tag)),
            0xfd => {
                let b = self.take(2).map_err(|_| BoltError::BigSizeTruncated)?;
                let value = u64::from(u16::from_be_bytes([b[0], b[1]]));
                if value < 0xfd {
                    return Err(BoltError::BigSizeNotMinimal);
                }
                Ok(value)
            }
            0xfe => {
                let b = self.take(4).map_err(|_| BoltError::BigSizeTruncated)?;
                let value = u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                if value < 0x1_0000 {
                    return Err(BoltError::BigSizeNotMinimal);
                }
                Ok(value)
            }
            0xff => {
                let b = self.take(8).map_err(|_| BoltError::BigSizeTruncated)?;
                let value =
                    u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                if value < 0x1_0000_0000 {
                    return Err(BoltError::BigSizeNotMinimal);
                }
                Ok(value)
            }
        }
    }
}

/// Appends a `u16 len || bytes` string.
///
/// Callers bound the byte string by construction; lengths above
/// [`MAX_MESSAGE_SIZE`] cannot be represented in the prefix.
pub fn put_u16_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= MAX_MESSAGE_SIZE);
    #[allow(clippy::cast_possible_truncation)] // bounded by the prefix width
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Appends a minimally-encoded `BigSize` varint.
#[allow(clippy::cast_possible_truncation)] // each arm checks the range first
pub fn put_bigsize(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value < 0x1_0000 {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value < 0x1_0000_0000 {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// A 32-byte channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelId(pub [u8; CHANNEL_ID_SIZE]);

impl ChannelId {
    /// Special all-zero channel ID: "all channels" in an error, "not
    /// channel-specific" in a warning.
    pub const ALL: Self = Self([0u8; CHANNEL_ID_SIZE]);

    #[must_use]
    pub const fn new(bytes: [u8; CHANNEL_ID_SIZE]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CHANNEL_ID_SIZE] {
        &self.0
    }

    /// Reads a channel ID from the payload.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if fewer than 32 bytes remain.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, BoltError> {
        let bytes = r.take(CHANNEL_ID_SIZE)?;
        Ok(Self(bytes.try_into().expect("take returned exactly 32 bytes")))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}
