//! Error types for the Noise protocol layer.

/// Errors from the BOLT 8 handshake and the transport cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseError {
    /// Act One carried an unsupported handshake version byte.
    ActOneBadVersion(u8),
    /// Act One ephemeral key failed to parse.
    ActOneBadPubkey,
    /// Act One AEAD tag verification failed.
    ActOneBadTag,
    /// Act Two carried an unsupported handshake version byte.
    ActTwoBadVersion(u8),
    /// Act Two ephemeral key failed to parse.
    ActTwoBadPubkey,
    /// Act Two AEAD tag verification failed.
    ActTwoBadTag,
    /// Act Three carried an unsupported handshake version byte.
    ActThreeBadVersion(u8),
    /// Act Three static-key ciphertext failed to decrypt.
    ActThreeBadCiphertext,
    /// Act Three decrypted static key failed to parse.
    ActThreeBadPubkey,
    /// Act Three final AEAD tag verification failed.
    ActThreeBadTag,
    /// Handshake method called out of order.
    InvalidState,
    /// Cipher states requested before the handshake completed.
    HandshakeIncomplete,
    /// AEAD tag verification failed on a post-handshake frame.
    FrameBadTag,
}

impl std::fmt::Display for NoiseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActOneBadVersion(v) => write!(f, "ACT1_BAD_VERSION {v}"),
            Self::ActOneBadPubkey => write!(f, "ACT1_BAD_PUBKEY"),
            Self::ActOneBadTag => write!(f, "ACT1_BAD_TAG"),
            Self::ActTwoBadVersion(v) => write!(f, "ACT2_BAD_VERSION {v}"),
            Self::ActTwoBadPubkey => write!(f, "ACT2_BAD_PUBKEY"),
            Self::ActTwoBadTag => write!(f, "ACT2_BAD_TAG"),
            Self::ActThreeBadVersion(v) => write!(f, "ACT3_BAD_VERSION {v}"),
            Self::ActThreeBadCiphertext => write!(f, "ACT3_BAD_CIPHERTEXT"),
            Self::ActThreeBadPubkey => write!(f, "ACT3_BAD_PUBKEY"),
            Self::ActThreeBadTag => write!(f, "ACT3_BAD_TAG"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::HandshakeIncomplete => write!(f, "HANDSHAKE_INCOMPLETE"),
            Self::FrameBadTag => write!(f, "FRAME_BAD_TAG"),
        }
    }
}

impl std::error::Error for NoiseError {}
