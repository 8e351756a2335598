//! Peer session configuration.

use std::time::Duration;

use secp256k1::{PublicKey, SecretKey};

/// Which side of the connection a session takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials out; knows the peer's static key up front and reconnects on
    /// unsolicited close.
    Initiator,
    /// Accepts an inbound connection; learns the peer's static key during
    /// the handshake.
    Responder,
}

/// Configuration for a [`PeerSession`](super::PeerSession).
pub struct SessionConfig {
    /// Static secp256k1 private key; the identity of this node. Stable
    /// across reconnects (the handshake ephemeral is fresh each attempt).
    pub local_static_secret: SecretKey,

    /// The peer's static public key. Required for an initiator; a responder
    /// may set it to pin the identity the initiator must prove in act three.
    pub remote_static_pubkey: Option<PublicKey>,

    /// Side of the connection.
    pub role: Role,

    /// Legacy global feature bits to advertise in init.
    pub global_features: Vec<u8>,

    /// Feature bits to advertise in init. Also defines which feature pairs
    /// count as known when validating the peer's required bits.
    pub features: Vec<u8>,

    /// Interval between liveness pings once the session is ready.
    pub ping_interval: Duration,

    /// How long an unanswered ping is allowed to stay outstanding.
    pub ping_timeout: Duration,

    /// Base delay before reconnecting after an unsolicited close, doubled
    /// per consecutive failed attempt. Zero disables reconnection.
    pub reconnect_timeout: Duration,
}

impl SessionConfig {
    /// Default ping interval and timeout (BOLT 1 liveness cadence).
    pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

    /// Default base reconnect delay.
    pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a config for the initiating side of a connection.
    #[must_use]
    pub fn initiator(local_static_secret: SecretKey, remote_static_pubkey: PublicKey) -> Self {
        Self {
            local_static_secret,
            remote_static_pubkey: Some(remote_static_pubkey),
            role: Role::Initiator,
            global_features: Vec::new(),
            features: Vec::new(),
            ping_interval: Self::DEFAULT_PING_INTERVAL,
            ping_timeout: Self::DEFAULT_PING_INTERVAL,
            reconnect_timeout: Self::DEFAULT_RECONNECT_TIMEOUT,
        }
    }

    /// Creates a config for the accepting side of a connection.
    #[must_use]
    pub fn responder(local_static_secret: SecretKey) -> Self {
        Self {
            local_static_secret,
            remote_static_pubkey: None,
            role: Role::Responder,
            global_features: Vec::new(),
            features: Vec::new(),
            ping_interval: Self::DEFAULT_PING_INTERVAL,
            ping_timeout: Self::DEFAULT_PING_INTERVAL,
            reconnect_timeout: Self::DEFAULT_RECONNECT_TIMEOUT,
        }
    }
}
