//! BOLT 1 init message.
//!
//! The first message on every connection: each side advertises its feature
//! bitmasks, optionally extended by a TLV tail. Only the two init TLVs this
//! crate understands (`networks`, `remote_addr`) are retained; unknown odd
//! records are skipped and unknown even records reject the message.

use super::BoltError;
use super::wire::{Reader, put_bigsize, put_u16_prefixed};

/// TLV type for chain hash list.
const TLV_NETWORKS: u64 = 1;

/// TLV type for remote address.
const TLV_REMOTE_ADDR: u64 = 3;

/// Size of a chain hash (SHA256).
const CHAIN_HASH_SIZE: usize = 32;

/// BOLT 1 init message (type 16).
///
/// Exchanged after the Noise handshake to negotiate features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Init {
    /// Legacy global features (deprecated, should be empty).
    pub globalfeatures: Vec<u8>,
    /// Feature bits supported by this node.
    pub features: Vec<u8>,
    /// Optional TLV extensions.
    pub tlvs: InitTlvs,
}

/// TLV extensions for the init message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitTlvs {
    /// Chain hashes this node is interested in (TLV type 1).
    ///
    /// Each entry is a 32-byte genesis block hash. If empty, the node
    /// supports all chains. If present, only channels for listed chains
    /// should be established.
    pub networks: Option<Vec<[u8; CHAIN_HASH_SIZE]>>,

    /// Remote address as seen by peer (TLV type 3).
    ///
    /// Allows a node to learn its external IP address.
    pub remote_addr: Option<Vec<u8>>,
}

impl Init {
    /// Creates an empty init message with no features.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            globalfeatures: Vec::new(),
            features: Vec::new(),
            tlvs: InitTlvs::default(),
        }
    }

    /// Creates an init advertising the given feature bitmasks.
    #[must_use]
    pub fn with_features(globalfeatures: Vec<u8>, features: Vec<u8>) -> Self {
        Self {
            globalfeatures,
            features,
            tlvs: InitTlvs::default(),
        }
    }

    /// Encodes to wire format (without message type prefix).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16_prefixed(&mut out, &self.globalfeatures);
        put_u16_prefixed(&mut out, &self.features);

        // TLV records in ascending type order: networks(1), remote_addr(3).
        if let Some(networks) = &self.tlvs.networks {
            put_bigsize(&mut out, TLV_NETWORKS);
            put_bigsize(&mut out, (networks.len() * CHAIN_HASH_SIZE) as u64);
            for hash in networks {
                out.extend_from_slice(hash);
            }
        }
        if let Some(remote_addr) = &self.tlvs.remote_addr {
            put_bigsize(&mut out, TLV_REMOTE_ADDR);
            put_bigsize(&mut out, remote_addr.len() as u64);
            out.extend_from_slice(remote_addr);
        }

        out
    }

    /// Decodes from wire format (without message type prefix).
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if a feature bitmask is cut short, or a TLV error
    /// if the trailing TLV records are malformed.
    pub fn decode(payload: &[u8]) -> Result<Self, BoltError> {
        let mut r = Reader::new(payload);
        let globalfeatures = r.u16_prefixed()?.to_vec();
        let features = r.u16_prefixed()?.to_vec();
        let tlvs = InitTlvs::decode(&mut r)?;

        Ok(Self {
            globalfeatures,
            features,
            tlvs,
        })
    }
}

impl InitTlvs {
    /// Walks the TLV tail of an init payload.
    ///
    /// Types must be strictly increasing. Known records (1, 3) are kept,
    /// unknown odd records are skipped, and unknown even records fail the
    /// decode per BOLT 1.
    fn decode(r: &mut Reader<'_>) -> Result<Self, BoltError> {
        let mut tlvs = Self::default();
        let mut last_type: Option<u64> = None;

        while !r.is_empty() {
            let tlv_type = r.bigsize()?;
            if let Some(previous) = last_type
                && tlv_type <= previous
            {
                return Err(BoltError::TlvNotIncreasing {
                    previous,
                    current: tlv_type,
                });
            }
            last_type = Some(tlv_type);

            let length =
                usize::try_from(r.bigsize()?).map_err(|_| BoltError::TlvLengthOverflow)?;
            let value = r.take(length).map_err(|_| BoltError::TlvLengthOverflow)?;

            match tlv_type {
                TLV_NETWORKS => {
                    let (chunks, remainder) = value.as_chunks::<CHAIN_HASH_SIZE>();
                    if !remainder.is_empty() {
                        return Err(BoltError::Truncated {
                            expected: (chunks.len() + 1) * CHAIN_HASH_SIZE,
                            actual: value.len(),
                        });
                    }
                    tlvs.networks = Some(chunks.to_vec());
                }
                TLV_REMOTE_ADDR => tlvs.remote_addr = Some(value.to_vec()),
                t if t % 2 == 0 => return Err(BoltError::TlvUnknownEvenType(t)),
                _ => {} // unknown odd records carry no obligations
            }
        }

        Ok(tlvs)
    }
}
