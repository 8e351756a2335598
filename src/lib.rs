//! Lightning Network peer transport.
//!
//! This crate implements the encrypted peer plumbing a Lightning wire stack
//! sits on:
//!
//! - [`noise`] - the BOLT 8 `Noise_XK` handshake and the framed,
//!   key-rotating transport that follows it.
//! - [`bolt`] - BOLT 1 message codecs (init, ping, pong, error, warning)
//!   and the `Message` classifier.
//! - [`peer`] - the session state machine: init exchange, ping/pong
//!   liveness, and initiator-side reconnection.
//!
//! A typical initiator:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use lnpeer::peer::{PeerSession, SessionConfig, SessionEvent, TcpConnector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let local_secret = secp256k1::SecretKey::from_byte_array([0x11; 32])?;
//! # let node_id = secp256k1::PublicKey::from_secret_key(
//! #     &secp256k1::Secp256k1::new(), &local_secret);
//! let connector = TcpConnector {
//!     addr: "127.0.0.1:9735".parse()?,
//!     timeout: Duration::from_secs(10),
//! };
//! let config = SessionConfig::initiator(local_secret, node_id);
//! let mut session = PeerSession::new(config, connector);
//! session.connect()?;
//!
//! while let Some(event) = session.next_event() {
//!     match event {
//!         SessionEvent::Ready => println!("peer is ready"),
//!         SessionEvent::Message(msg) => println!("got {}", msg.msg_type()),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bolt;
pub mod noise;
pub mod peer;
