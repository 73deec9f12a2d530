//! Schnorr signature verification over accumulated signer keys.
//!
//! During execution `AddSig` collects the public keys that must co-sign the
//! enclosing transaction. After a successful run the driver checks the
//! transaction's signatures against every collected key; a missing or
//! invalid signature rejects the whole invocation.

use crate::crypto::secp::PubKey;
use k256::schnorr::signature::Verifier;
use k256::schnorr::{Signature, VerifyingKey};

/// Serialized Schnorr signature length.
pub const SIGNATURE_LEN: usize = 64;

/// A BIP340-style Schnorr signature as carried by the transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchnorrSig(pub [u8; SIGNATURE_LEN]);

/// The transaction-side material the driver verifies accumulated keys
/// against: the signed message and one signature per required signer, in
/// `AddSig` order.
#[derive(Clone, Debug, Default)]
pub struct SigBundle {
    pub message: [u8; 32],
    pub signatures: Vec<SchnorrSig>,
}

/// Checks that every accumulated signer key has a valid signature over the
/// message. Key parity bytes are ignored: verification is x-only.
pub fn verify_signers(message: &[u8; 32], signers: &[PubKey], sigs: &[SchnorrSig]) -> bool {
    if signers.len() != sigs.len() {
        return false;
    }
    for (pk, sig) in signers.iter().zip(sigs) {
        let Ok(key) = VerifyingKey::from_bytes(&pk.x) else {
            return false;
        };
        let Ok(sig) = Signature::try_from(&sig.0[..]) else {
            return false;
        };
        if key.verify(message, &sig).is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::schnorr::signature::Signer;
    use k256::schnorr::SigningKey;
    use rand_core::OsRng;

    fn keypair() -> (SigningKey, PubKey) {
        let sk = SigningKey::random(&mut OsRng);
        let pk = PubKey {
            x: sk.verifying_key().to_bytes().into(),
            parity: 0,
        };
        (sk, pk)
    }

    fn sign(sk: &SigningKey, message: &[u8; 32]) -> SchnorrSig {
        let sig: Signature = sk.sign(message);
        SchnorrSig(sig.to_bytes().into())
    }

    #[test]
    fn valid_signature_accepted() {
        let (sk, pk) = keypair();
        let message = [7u8; 32];
        let sig = sign(&sk, &message);
        assert!(verify_signers(&message, &[pk], &[sig]));
    }

    #[test]
    fn wrong_key_rejected() {
        let (sk, _) = keypair();
        let (_, other_pk) = keypair();
        let message = [7u8; 32];
        let sig = sign(&sk, &message);
        assert!(!verify_signers(&message, &[other_pk], &[sig]));
    }

    #[test]
    fn tampered_message_rejected() {
        let (sk, pk) = keypair();
        let sig = sign(&sk, &[7u8; 32]);
        assert!(!verify_signers(&[8u8; 32], &[pk], &[sig]));
    }

    #[test]
    fn count_mismatch_rejected() {
        let (sk, pk) = keypair();
        let message = [7u8; 32];
        let sig = sign(&sk, &message);
        assert!(!verify_signers(&message, &[pk], &[]));
        assert!(!verify_signers(&message, &[], &[sig]));
    }

    #[test]
    fn no_signers_is_vacuously_valid() {
        assert!(verify_signers(&[0u8; 32], &[], &[]));
    }

    #[test]
    fn multiple_signers_all_checked() {
        let (sk1, pk1) = keypair();
        let (sk2, pk2) = keypair();
        let message = [1u8; 32];
        let s1 = sign(&sk1, &message);
        let s2 = sign(&sk2, &message);
        assert!(verify_signers(&message, &[pk1, pk2], &[s1, s2]));
        // Swapped order pairs keys with the wrong signatures.
        assert!(!verify_signers(&message, &[pk1, pk2], &[s2, s1]));
    }
}
