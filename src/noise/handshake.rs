//! BOLT 8 Noise_XK handshake.
//!
//! Three fixed-size acts establish the transport keys: the initiator proves
//! knowledge of the responder's static key in act one, the responder answers
//! with its ephemeral in act two, and the initiator reveals its own static
//! key (encrypted) in act three. Completion yields the per-direction
//! [`CipherState`] pair.

use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::cipher::{CipherState, decrypt_with_ad, encrypt_with_ad, hkdf_two_keys};
use super::error::NoiseError;

/// Protocol name hashed into the initial transcript state.
const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";

/// Prologue mixed into the transcript after the protocol name.
const PROLOGUE: &[u8] = b"lightning";

/// Handshake version byte; anything else is a protocol violation.
const VERSION: u8 = 0;

/// Act One size: version(1) + ephemeral pubkey(33) + tag(16).
pub const ACT_ONE_SIZE: usize = 50;

/// Act Two size: version(1) + ephemeral pubkey(33) + tag(16).
pub const ACT_TWO_SIZE: usize = 50;

/// Act Three size: version(1) + encrypted static pubkey(49) + tag(16).
pub const ACT_THREE_SIZE: usize = 66;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Initiator,
    Responder,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Initiator: act one not yet produced.
    InitiatorStart,
    /// Initiator: act one sent, act two expected.
    InitiatorAwaitingActTwo,
    /// Responder: act one expected.
    ResponderStart,
    /// Responder: act two sent, act three expected.
    ResponderAwaitingActThree,
    Complete,
}

/// State machine for one BOLT 8 handshake.
///
/// Created per connection attempt and consumed by
/// [`into_cipher_states`](Self::into_cipher_states) on completion. Dropping
/// the machine at any point wipes the transcript and derived key material.
pub struct NoiseHandshake {
    role: Role,
    step: Step,
    /// Chaining key, ratcheted by each ECDH result.
    ck: [u8; 32],
    /// Transcript hash binding every act to its predecessors.
    h: [u8; 32],
    local_static: SecretKey,
    local_ephemeral: SecretKey,
    /// Known up front for the initiator; learned in act three by the responder.
    remote_static: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
    /// Act-two temporary key, needed again while building/reading act three.
    temp_k2: Option<[u8; 32]>,
    secp: Secp256k1<secp256k1::All>,
}

impl NoiseHandshake {
    /// Creates the initiator side.
    ///
    /// The initiator must already know the responder's static public key;
    /// `local_ephemeral` must be freshly generated for this attempt.
    #[must_use]
    pub fn new_initiator(
        local_static: SecretKey,
        local_ephemeral: SecretKey,
        remote_static: PublicKey,
    ) -> Self {
        let (ck, h) = transcript_init(&remote_static);
        Self {
            role: Role::Initiator,
            step: Step::InitiatorStart,
            ck,
            h,
            local_static,
            local_ephemeral,
            remote_static: Some(remote_static),
            remote_ephemeral: None,
            temp_k2: None,
            secp: Secp256k1::new(),
        }
    }

    /// Creates the responder side.
    ///
    /// The responder learns the initiator's static key from act three;
    /// `local_ephemeral` must be freshly generated for this attempt.
    #[must_use]
    pub fn new_responder(local_static: SecretKey, local_ephemeral: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let local_static_pub = PublicKey::from_secret_key(&secp, &local_static);
        let (ck, h) = transcript_init(&local_static_pub);
        Self {
            role: Role::Responder,
            step: Step::ResponderStart,
            ck,
            h,
            local_static,
            local_ephemeral,
            remote_static: None,
            remote_ephemeral: None,
            temp_k2: None,
            secp,
        }
    }

    // ----- initiator -----

    /// Produces act one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when called out of order.
    pub fn get_act_one(&mut self) -> Result<[u8; ACT_ONE_SIZE], NoiseError> {
        if self.step != Step::InitiatorStart {
            return Err(NoiseError::InvalidState);
        }

        let e_pub = PublicKey::from_secret_key(&self.secp, &self.local_ephemeral);
        self.mix_hash(&e_pub.serialize());

        // es = ECDH(e, rs); ck, temp_k1 = HKDF(ck, es)
        let rs = self.remote_static.expect("initiator always has remote static");
        let es = ecdh(&self.local_ephemeral, &rs);
        let (ck, temp_k1) = hkdf_two_keys(&self.ck, &es);
        self.ck = ck;

        // Tag over an empty plaintext, transcript as AD.
        let tag = encrypt_with_ad(&temp_k1, 0, &self.h, &[]);
        self.mix_hash(&tag);

        let mut act = [0u8; ACT_ONE_SIZE];
        act[0] = VERSION;
        act[1..34].copy_from_slice(&e_pub.serialize());
        act[34..].copy_from_slice(&tag);

        self.step = Step::InitiatorAwaitingActTwo;
        Ok(act)
    }

    /// Consumes act two and produces act three.
    ///
    /// # Errors
    ///
    /// Returns an act-two error if the version, key, or tag is invalid, or
    /// `InvalidState` when called out of order.
    pub fn process_act_two(
        &mut self,
        act_two: &[u8; ACT_TWO_SIZE],
    ) -> Result<[u8; ACT_THREE_SIZE], NoiseError> {
        if self.step != Step::InitiatorAwaitingActTwo {
            return Err(NoiseError::InvalidState);
        }

        let version = act_two[0];
        let re_bytes = &act_two[1..34];
        let tag = &act_two[34..];

        if version != VERSION {
            return Err(NoiseError::ActTwoBadVersion(version));
        }
        let re = PublicKey::from_slice(re_bytes).map_err(|_| NoiseError::ActTwoBadPubkey)?;
        self.remote_ephemeral = Some(re);
        self.mix_hash(re_bytes);

        // ee = ECDH(e, re); ck, temp_k2 = HKDF(ck, ee)
        let ee = ecdh(&self.local_ephemeral, &re);
        let (ck, temp_k2) = hkdf_two_keys(&self.ck, &ee);
        self.ck = ck;
        self.temp_k2 = Some(temp_k2);

        decrypt_with_ad(&temp_k2, 0, &self.h, tag).map_err(|_| NoiseError::ActTwoBadTag)?;
        self.mix_hash(tag);

        Ok(self.build_act_three())
    }

    fn build_act_three(&mut self) -> [u8; ACT_THREE_SIZE] {
        let temp_k2 = self.temp_k2.expect("set while processing act two");

        // Encrypt our static key under the act-two temporary key, nonce 1.
        let s_pub = PublicKey::from_secret_key(&self.secp, &self.local_static);
        let ciphertext = encrypt_with_ad(&temp_k2, 1, &self.h, &s_pub.serialize());
        self.mix_hash(&ciphertext);

        // se = ECDH(s, re); ck, temp_k3 = HKDF(ck, se)
        let re = self.remote_ephemeral.expect("set while processing act two");
        let se = ecdh(&self.local_static, &re);
        let (ck, temp_k3) = hkdf_two_keys(&self.ck, &se);
        self.ck = ck;

        let tag = encrypt_with_ad(&temp_k3, 0, &self.h, &[]);

        let mut act = [0u8; ACT_THREE_SIZE];
        act[0] = VERSION;
        act[1..50].copy_from_slice(&ciphertext);
        act[50..].copy_from_slice(&tag);

        self.step = Step::Complete;
        act
    }

    // ----- responder -----

    /// Consumes act one and produces act two.
    ///
    /// # Errors
    ///
    /// Returns an act-one error if the version, key, or tag is invalid, or
    /// `InvalidState` when called out of order.
    pub fn process_act_one(
        &mut self,
        act_one: &[u8; ACT_ONE_SIZE],
    ) -> Result<[u8; ACT_TWO_SIZE], NoiseError> {
        if self.step != Step::ResponderStart {
            return Err(NoiseError::InvalidState);
        }

        let version = act_one[0];
        let re_bytes = &act_one[1..34];
        let tag = &act_one[34..];

        if version != VERSION {
            return Err(NoiseError::ActOneBadVersion(version));
        }
        let re = PublicKey::from_slice(re_bytes).map_err(|_| NoiseError::ActOneBadPubkey)?;
        self.remote_ephemeral = Some(re);
        self.mix_hash(re_bytes);

        // es = ECDH(s, re); ck, temp_k1 = HKDF(ck, es)
        let es = ecdh(&self.local_static, &re);
        let (ck, temp_k1) = hkdf_two_keys(&self.ck, &es);
        self.ck = ck;

        decrypt_with_ad(&temp_k1, 0, &self.h, tag).map_err(|_| NoiseError::ActOneBadTag)?;
        self.mix_hash(tag);

        Ok(self.build_act_two())
    }

    fn build_act_two(&mut self) -> [u8; ACT_TWO_SIZE] {
        let e_pub = PublicKey::from_secret_key(&self.secp, &self.local_ephemeral);
        self.mix_hash(&e_pub.serialize());

        // ee = ECDH(e, re); ck, temp_k2 = HKDF(ck, ee)
        let re = self.remote_ephemeral.expect("set while processing act one");
        let ee = ecdh(&self.local_ephemeral, &re);
        let (ck, temp_k2) = hkdf_two_keys(&self.ck, &ee);
        self.ck = ck;
        self.temp_k2 = Some(temp_k2);

        let tag = encrypt_with_ad(&temp_k2, 0, &self.h, &[]);
        self.mix_hash(&tag);

        let mut act = [0u8; ACT_TWO_SIZE];
        act[0] = VERSION;
        act[1..34].copy_from_slice(&e_pub.serialize());
        act[34..].copy_from_slice(&tag);

        self.step = Step::ResponderAwaitingActThree;
        act
    }

    /// Consumes act three, returning the initiator's static public key.
    ///
    /// # Errors
    ///
    /// Returns an act-three error if the version, ciphertext, key, or tag is
    /// invalid, or `InvalidState` when called out of order.
    pub fn process_act_three(
        &mut self,
        act_three: &[u8; ACT_THREE_SIZE],
    ) -> Result<PublicKey, NoiseError> {
        if self.step != Step::ResponderAwaitingActThree {
            return Err(NoiseError::InvalidState);
        }

        let version = act_three[0];
        let ciphertext = &act_three[1..50];
        let tag = &act_three[50..];

        if version != VERSION {
            return Err(NoiseError::ActThreeBadVersion(version));
        }

        let temp_k2 = self.temp_k2.expect("set while building act two");
        let rs_bytes = decrypt_with_ad(&temp_k2, 1, &self.h, ciphertext)
            .map_err(|_| NoiseError::ActThreeBadCiphertext)?;
        let rs = PublicKey::from_slice(&rs_bytes).map_err(|_| NoiseError::ActThreeBadPubkey)?;
        self.remote_static = Some(rs);
        self.mix_hash(ciphertext);

        // se = ECDH(e, rs); ck, temp_k3 = HKDF(ck, se)
        let se = ecdh(&self.local_ephemeral, &rs);
        let (ck, temp_k3) = hkdf_two_keys(&self.ck, &se);
        self.ck = ck;

        decrypt_with_ad(&temp_k3, 0, &self.h, tag).map_err(|_| NoiseError::ActThreeBadTag)?;

        self.step = Step::Complete;
        Ok(rs)
    }

    // ----- completion -----

    /// Final send/receive keys for this party, for vector verification.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeIncomplete` before the final act is processed.
    pub fn final_keys(&self) -> Result<([u8; 32], [u8; 32]), NoiseError> {
        if self.step != Step::Complete {
            return Err(NoiseError::HandshakeIncomplete);
        }

        // sk, rk = HKDF(ck, empty) from the initiator's point of view.
        let (sk, rk) = hkdf_two_keys(&self.ck, &[]);
        match self.role {
            Role::Initiator => Ok((sk, rk)),
            Role::Responder => Ok((rk, sk)),
        }
    }

    /// Consumes the machine, yielding the `(send, recv)` cipher states.
    ///
    /// Both start at nonce zero and share the final chaining key.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeIncomplete` before the final act is processed.
    pub fn into_cipher_states(self) -> Result<(CipherState, CipherState), NoiseError> {
        let (send_key, recv_key) = self.final_keys()?;
        let ck = self.ck;
        Ok((
            CipherState::new(send_key, ck),
            CipherState::new(recv_key, ck),
        ))
    }

    /// The peer's static public key, once known.
    #[must_use]
    pub fn remote_static(&self) -> Option<PublicKey> {
        self.remote_static
    }

    fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }
}

impl Drop for NoiseHandshake {
    fn drop(&mut self) {
        self.ck.zeroize();
        self.h.zeroize();
        if let Some(temp_k2) = self.temp_k2.as_mut() {
            temp_k2.zeroize();
        }
    }
}

/// Initial transcript state: hash the protocol name, the prologue, and the
/// responder's static public key.
fn transcript_init(responder_static: &PublicKey) -> ([u8; 32], [u8; 32]) {
    let ck: [u8; 32] = Sha256::digest(PROTOCOL_NAME).into();

    let h: [u8; 32] = {
        let mut hasher = Sha256::new();
        hasher.update(ck);
        hasher.update(PROLOGUE);
        hasher.finalize().into()
    };

    let h: [u8; 32] = {
        let mut hasher = Sha256::new();
        hasher.update(h);
        hasher.update(responder_static.serialize());
        hasher.finalize().into()
    };

    (ck, h)
}

/// ECDH returning SHA256 of the shared point's x coordinate.
fn ecdh(secret: &SecretKey, public: &PublicKey) -> [u8; 32] {
    SharedSecret::new(public, secret).secret_bytes()
}
