//! secp256k1 scalar and point arithmetic for the `Secp_*` host bindings and
//! the funds commitment.

use crate::types::ids::AssetId;
use contract_vm_derive::BinaryCodec;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Serialized public key length: 32-byte x coordinate plus a parity byte.
pub const PUBKEY_LEN: usize = 33;

/// Serialized scalar length.
pub const SCALAR_LEN: usize = 32;

/// Public key as contracts see it in linear memory: the x coordinate
/// followed by the y-parity byte. The all-zero value denotes the point at
/// infinity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, BinaryCodec)]
pub struct PubKey {
    pub x: [u8; 32],
    pub parity: u8,
}

impl PubKey {
    /// Returns true for the all-zero (infinity) encoding.
    pub fn is_zero(&self) -> bool {
        self.parity == 0 && self.x.iter().all(|&b| b == 0)
    }
}

/// Decodes a scalar from its 32-byte big-endian representation.
///
/// Returns `None` when the value is not canonical (≥ the group order).
pub fn scalar_from_bytes(bytes: &[u8; SCALAR_LEN]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
}

/// Encodes a scalar as 32 big-endian bytes.
pub fn scalar_to_bytes(s: &Scalar) -> [u8; SCALAR_LEN] {
    s.to_bytes().into()
}

/// Decodes a point from its x-plus-parity form.
///
/// The all-zero key decodes to the point at infinity. Returns `None` when x
/// is not on the curve.
pub fn point_from_pubkey(pk: &PubKey) -> Option<ProjectivePoint> {
    if pk.is_zero() {
        return Some(ProjectivePoint::IDENTITY);
    }
    let mut sec1 = [0u8; PUBKEY_LEN];
    sec1[0] = 0x02 | (pk.parity & 1);
    sec1[1..].copy_from_slice(&pk.x);
    let encoded = EncodedPoint::from_bytes(sec1).ok()?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
}

/// Encodes a point into its x-plus-parity form.
pub fn pubkey_from_point(p: &ProjectivePoint) -> PubKey {
    if *p == ProjectivePoint::IDENTITY {
        return PubKey::default();
    }
    let encoded = p.to_affine().to_encoded_point(true);
    let bytes = encoded.as_bytes();
    let mut x = [0u8; 32];
    x.copy_from_slice(&bytes[1..33]);
    PubKey {
        x,
        parity: bytes[0] & 1,
    }
}

/// The standard generator G.
pub fn generator() -> ProjectivePoint {
    ProjectivePoint::GENERATOR
}

/// The auxiliary generator J, used for key blinding.
///
/// Derived by hashing to the curve, so its discrete log with respect to G is
/// unknown.
pub fn generator_j() -> ProjectivePoint {
    static J: OnceLock<ProjectivePoint> = OnceLock::new();
    *J.get_or_init(|| hash_to_point(b"cvm.gen.J", &[]))
}

/// The per-asset generator H_a used for funds commitments.
pub fn asset_generator(aid: AssetId) -> ProjectivePoint {
    hash_to_point(b"cvm.gen.H", &aid.to_le_bytes())
}

/// Maps a tag and payload onto a curve point by try-and-increment over
/// hashed x candidates. Roughly half the candidates decompress, so the loop
/// terminates after a couple of iterations in practice.
fn hash_to_point(tag: &[u8], data: &[u8]) -> ProjectivePoint {
    for counter in 0u32.. {
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(data);
        hasher.update(counter.to_le_bytes());
        let candidate: [u8; 32] = hasher.finalize().into();

        let mut sec1 = [0u8; PUBKEY_LEN];
        sec1[0] = 0x02;
        sec1[1..].copy_from_slice(&candidate);
        if let Ok(encoded) = EncodedPoint::from_bytes(sec1) {
            if let Some(point) =
                Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            {
                return ProjectivePoint::from(point);
            }
        }
    }
    unreachable!("try-and-increment exhausted the u32 counter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_roundtrip() {
        let p = generator() * Scalar::from(7u64);
        let pk = pubkey_from_point(&p);
        assert_eq!(point_from_pubkey(&pk), Some(p));
    }

    #[test]
    fn zero_pubkey_is_infinity() {
        let pk = PubKey::default();
        assert_eq!(point_from_pubkey(&pk), Some(ProjectivePoint::IDENTITY));
        assert_eq!(pubkey_from_point(&ProjectivePoint::IDENTITY), pk);
    }

    #[test]
    fn scalar_roundtrip() {
        let s = Scalar::from(123_456_789u64);
        let bytes = scalar_to_bytes(&s);
        assert_eq!(scalar_from_bytes(&bytes), Some(s));
    }

    #[test]
    fn scalar_rejects_noncanonical() {
        // The group order minus nothing: 2^256 - 1 is far above the order.
        assert_eq!(scalar_from_bytes(&[0xFF; 32]), None);
    }

    #[test]
    fn generators_are_distinct() {
        let g = generator();
        let j = generator_j();
        let h0 = asset_generator(0);
        let h1 = asset_generator(1);
        assert_ne!(g, j);
        assert_ne!(g, h0);
        assert_ne!(h0, h1);
    }

    #[test]
    fn generator_j_is_stable() {
        assert_eq!(generator_j(), generator_j());
    }

    #[test]
    fn asset_generator_deterministic() {
        assert_eq!(asset_generator(42), asset_generator(42));
    }
}
