//! Feature-bit helpers for init negotiation.
//!
//! Feature bitmasks are big-endian byte strings: bit 0 is the least
//! significant bit of the final byte. Even bits mark features a peer
//! requires; the adjacent odd bit marks the same feature as optional.

/// Returns whether `bit` is set in a feature bitmask.
#[must_use]
pub fn feature_bit(features: &[u8], bit: usize) -> bool {
    let byte = bit / 8;
    if byte >= features.len() {
        return false;
    }
    features[features.len() - 1 - byte] & (1 << (bit % 8)) != 0
}

/// Finds the first required (even) bit in `remote` whose feature pair is
/// absent from `local`.
///
/// A pair counts as known if `local` advertises either its even or its odd
/// bit. Per BOLT 9 a node tolerates unknown odd bits but must fail the
/// connection when the peer requires a feature it does not implement.
#[must_use]
pub fn unknown_required_bit(remote: &[u8], local: &[u8]) -> Option<usize> {
    (0..remote.len() * 8)
        .step_by(2)
        .find(|&bit| feature_bit(remote, bit) && !feature_bit(local, bit) && !feature_bit(local, bit | 1))
}
