//! BOLT 1 peer session layered on the Noise transport.
//!
//! A session brings a connection from raw TCP to `Ready`: it drives the
//! handshake, exchanges init messages, answers pings, validates pongs, and
//! reconnects (initiator side) after unsolicited closes.

mod config;
mod features;
mod pingpong;
mod session;

pub use config::{Role, SessionConfig};
pub use features::{feature_bit, unknown_required_bit};
pub use pingpong::{LivenessCheck, PONG_DECLINE_THRESHOLD, PingPong, PongFault};
pub use session::{
    Accepted, Connector, PeerSession, PeerState, SessionError, SessionEvent, TcpConnector,
};

#[cfg(test)]
mod tests;
