//! Signer recovery for leader-signed messages.
//!
//! Leaders never sign a raw message hash. The hash is first wrapped in a
//! fixed prefix, so a leader signature can't be replayed as a signature over
//! some other kind of payload:
//!
//! ```text
//! signed = BLAKE3("\x19Cascade Signed Message:\n32" ‖ message_hash)
//! ```
//!
//! ed25519 has no public-key recovery. A [`LeaderSignature`] therefore carries
//! the verifying key next to the signature bytes; [`recover`] verifies the
//! pair and returns the address derived from the key.

use crate::identity::Address;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Domain prefix applied before signing.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Cascade Signed Message:\n32";

/// A 32-byte message digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHash(pub [u8; 32]);

impl MessageHash {
    /// Hash arbitrary bytes with Blake3.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The digest leaders actually sign.
    pub fn prefixed(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SIGNED_MESSAGE_PREFIX);
        hasher.update(&self.0);
        *hasher.finalize().as_bytes()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A signature over a prefixed [`MessageHash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderSignature {
    /// Signer's ed25519 verifying key
    pub public_key: [u8; 32],
    /// Raw ed25519 signature
    pub signature: [u8; 64],
}

/// Sign a message hash with the prefixing convention.
pub fn sign(key: &SigningKey, hash: &MessageHash) -> LeaderSignature {
    let signature = key.sign(&hash.prefixed());
    LeaderSignature {
        public_key: key.verifying_key().to_bytes(),
        signature: signature.to_bytes(),
    }
}

/// Recover the signer of `hash`.
///
/// Returns `None` when the key is malformed or the signature doesn't verify.
pub fn recover(hash: &MessageHash, sig: &LeaderSignature) -> Option<Address> {
    let key = VerifyingKey::from_bytes(&sig.public_key).ok()?;
    let signature = Signature::from_bytes(&sig.signature);
    key.verify_strict(&hash.prefixed(), &signature).ok()?;
    Some(Address::from_verifying_key(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn recovers_signer_address() {
        let signer = key(1);
        let hash = MessageHash::of(b"update metadata");
        let sig = sign(&signer, &hash);
        assert_eq!(
            recover(&hash, &sig),
            Some(Address::from_verifying_key(&signer.verifying_key()))
        );
    }

    #[test]
    fn different_message_fails() {
        let sig = sign(&key(1), &MessageHash::of(b"a"));
        assert_eq!(recover(&MessageHash::of(b"b"), &sig), None);
    }

    #[test]
    fn swapped_key_fails() {
        let hash = MessageHash::of(b"a");
        let mut sig = sign(&key(1), &hash);
        // Claiming someone else's key with our signature must not verify
        sig.public_key = key(2).verifying_key().to_bytes();
        assert_eq!(recover(&hash, &sig), None);
    }

    #[test]
    fn unprefixed_signature_is_rejected() {
        let signer = key(4);
        let hash = MessageHash::of(b"transfer");
        let raw = signer.sign(&hash.0);
        let sig = LeaderSignature {
            public_key: signer.verifying_key().to_bytes(),
            signature: raw.to_bytes(),
        };
        assert_eq!(recover(&hash, &sig), None);
    }
}
