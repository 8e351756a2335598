//! Transport cipher state and AEAD primitives.
//!
//! Post-handshake traffic is encrypted with ChaCha20-Poly1305 under a pair of
//! [`CipherState`]s, one per direction. Each state carries its own key,
//! chaining key, and nonce counter, and rotates its key every
//! [`KEY_ROTATION_INTERVAL`] AEAD operations per BOLT 8.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::NoiseError;

/// Size of a Poly1305 authentication tag.
pub const MAC_SIZE: usize = 16;

/// Size of the encrypted length prefix: 2-byte length + MAC.
pub const ENCRYPTED_LENGTH_SIZE: usize = 2 + MAC_SIZE;

/// Maximum Lightning message size (2-byte length prefix limit).
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// AEAD operations performed with one key before it is rotated.
pub const KEY_ROTATION_INTERVAL: u64 = 1000;

/// Derives two 32-byte keys via HKDF-SHA256 with an empty info string.
///
/// Used for every chaining-key step of the handshake and for key rotation.
pub(crate) fn hkdf_two_keys(salt: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), ikm);
    let mut okm = [0u8; 64];
    hk.expand(&[], &mut okm)
        .expect("64 bytes is a valid HKDF-SHA256 output length");

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    okm.zeroize();
    (first, second)
}

/// Builds the 96-bit AEAD nonce: 4 zero bytes then the counter little-endian.
fn aead_nonce(counter: u64) -> Nonce {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    Nonce::from(nonce)
}

/// Encrypts `plaintext` with associated data, returning ciphertext + tag.
pub(crate) fn encrypt_with_ad(key: &[u8; 32], counter: u64, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            &aead_nonce(counter),
            Payload {
                msg: plaintext,
                aad: ad,
            },
        )
        .expect("ChaCha20-Poly1305 encryption of in-memory buffers cannot fail")
}

/// Decrypts `ciphertext` (tag included) with associated data.
///
/// # Errors
///
/// Returns an opaque AEAD error if tag verification fails; callers map it to
/// the appropriate [`NoiseError`] variant.
pub(crate) fn decrypt_with_ad(
    key: &[u8; 32],
    counter: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, chacha20poly1305::aead::Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.decrypt(
        &aead_nonce(counter),
        Payload {
            msg: ciphertext,
            aad: ad,
        },
    )
}

/// One direction of the post-handshake transport cipher.
///
/// The nonce advances by one per AEAD operation. After
/// [`KEY_ROTATION_INTERVAL`] operations the key is replaced via
/// `ck, k = HKDF(ck, k)` and the nonce resets to zero, so a nonce is never
/// reused under any key.
pub struct CipherState {
    key: [u8; 32],
    chaining_key: [u8; 32],
    nonce: u64,
    messages_sent: u64,
}

impl CipherState {
    pub(crate) fn new(key: [u8; 32], chaining_key: [u8; 32]) -> Self {
        Self {
            key,
            chaining_key,
            nonce: 0,
            messages_sent: 0,
        }
    }

    /// Current nonce counter (resets to zero at each key rotation).
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Encrypts one AEAD message and advances the nonce.
    pub(crate) fn encrypt(&mut self, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let ciphertext = encrypt_with_ad(&self.key, self.nonce, ad, plaintext);
        self.advance();
        ciphertext
    }

    /// Decrypts one AEAD message and advances the nonce.
    ///
    /// The nonce does not advance on failure; a failed decryption leaves the
    /// state unusable anyway because the peer's counter is ahead.
    ///
    /// # Errors
    ///
    /// Returns [`NoiseError::FrameBadTag`] if tag verification fails.
    pub(crate) fn decrypt(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let plaintext = decrypt_with_ad(&self.key, self.nonce, ad, ciphertext)
            .map_err(|_| NoiseError::FrameBadTag)?;
        self.advance();
        Ok(plaintext)
    }

    fn advance(&mut self) {
        self.nonce += 1;
        self.messages_sent += 1;
        if self.messages_sent == KEY_ROTATION_INTERVAL {
            self.rotate_key();
        }
    }

    /// Ratchets the key forward: `ck, k = HKDF(ck, k)`, nonce back to zero.
    fn rotate_key(&mut self) {
        let (chaining_key, key) = hkdf_two_keys(&self.chaining_key, &self.key);
        self.chaining_key.zeroize();
        self.key.zeroize();
        self.chaining_key = chaining_key;
        self.key = key;
        self.nonce = 0;
        self.messages_sent = 0;
    }

    /// Destroys the key material in place. The state fails every subsequent
    /// operation in a way the peer cannot authenticate.
    pub(crate) fn wipe(&mut self) {
        self.key.zeroize();
        self.chaining_key.zeroize();
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.wipe();
    }
}
