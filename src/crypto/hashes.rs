//! Incremental hash contexts for the `HashCreate*` host bindings.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Largest digest a context can produce (Blake2b's maximum).
pub const MAX_DIGEST_LEN: usize = 64;

/// Longest Blake2b personalization blob accepted.
pub const MAX_PERSONAL_LEN: usize = 16;

/// A hash computation in progress.
///
/// Contracts allocate a context, stream data into it, read the digest out
/// and free it. Reading the digest does not consume the context; more data
/// may be written afterwards.
pub enum HashContext {
    Sha256(Sha256),
    Blake2b {
        state: blake2b_simd::State,
        digest_len: usize,
    },
    Keccak256(Keccak256),
}

impl HashContext {
    /// Starts a SHA-256 computation.
    pub fn sha256() -> HashContext {
        HashContext::Sha256(Sha256::new())
    }

    /// Starts a Keccak-256 computation.
    pub fn keccak256() -> HashContext {
        HashContext::Keccak256(Keccak256::new())
    }

    /// Starts a Blake2b computation with the given personalization blob and
    /// digest length.
    ///
    /// Returns `None` when `digest_len` is outside `1..=64` or the blob is
    /// longer than 16 bytes.
    pub fn blake2b(personal: &[u8], digest_len: usize) -> Option<HashContext> {
        if digest_len == 0 || digest_len > MAX_DIGEST_LEN || personal.len() > MAX_PERSONAL_LEN {
            return None;
        }
        let state = blake2b_simd::Params::new()
            .hash_length(digest_len)
            .personal(personal)
            .to_state();
        Some(HashContext::Blake2b { state, digest_len })
    }

    /// Feeds data into the computation.
    pub fn write(&mut self, data: &[u8]) {
        match self {
            HashContext::Sha256(h) => h.update(data),
            HashContext::Blake2b { state, .. } => {
                state.update(data);
            }
            HashContext::Keccak256(h) => h.update(data),
        }
    }

    /// Digest length of this context in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            HashContext::Sha256(_) | HashContext::Keccak256(_) => 32,
            HashContext::Blake2b { digest_len, .. } => *digest_len,
        }
    }

    /// Writes the digest of the data consumed so far into `out`.
    ///
    /// Copies `min(out.len(), digest_len())` bytes. The context remains
    /// usable afterwards.
    pub fn digest_into(&self, out: &mut [u8]) {
        match self {
            HashContext::Sha256(h) => {
                let digest = h.clone().finalize();
                let n = out.len().min(digest.len());
                out[..n].copy_from_slice(&digest[..n]);
            }
            HashContext::Keccak256(h) => {
                let digest = h.clone().finalize();
                let n = out.len().min(digest.len());
                out[..n].copy_from_slice(&digest[..n]);
            }
            HashContext::Blake2b { state, .. } => {
                let digest = state.clone().finalize();
                let bytes = digest.as_bytes();
                let n = out.len().min(bytes.len());
                out[..n].copy_from_slice(&bytes[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let mut ctx = HashContext::sha256();
        ctx.write(b"abc");
        let mut out = [0u8; 32];
        ctx.digest_into(&mut out);
        assert_eq!(
            out[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
    }

    #[test]
    fn digest_does_not_consume() {
        let mut ctx = HashContext::sha256();
        ctx.write(b"ab");
        let mut first = [0u8; 32];
        ctx.digest_into(&mut first);

        ctx.write(b"c");
        let mut second = [0u8; 32];
        ctx.digest_into(&mut second);

        let mut full = HashContext::sha256();
        full.write(b"abc");
        let mut expected = [0u8; 32];
        full.digest_into(&mut expected);
        assert_eq!(second, expected);
        assert_ne!(first, second);
    }

    #[test]
    fn blake2b_personalization_changes_digest() {
        let mut a = HashContext::blake2b(b"persona-one", 32).unwrap();
        let mut b = HashContext::blake2b(b"persona-two", 32).unwrap();
        a.write(b"data");
        b.write(b"data");
        let mut da = [0u8; 32];
        let mut db = [0u8; 32];
        a.digest_into(&mut da);
        b.digest_into(&mut db);
        assert_ne!(da, db);
    }

    #[test]
    fn blake2b_rejects_bad_params() {
        assert!(HashContext::blake2b(b"", 0).is_none());
        assert!(HashContext::blake2b(b"", 65).is_none());
        assert!(HashContext::blake2b(&[0u8; 17], 32).is_none());
        assert!(HashContext::blake2b(&[0u8; 16], 64).is_some());
    }

    #[test]
    fn keccak256_differs_from_sha256() {
        let mut k = HashContext::keccak256();
        let mut s = HashContext::sha256();
        k.write(b"x");
        s.write(b"x");
        let mut dk = [0u8; 32];
        let mut ds = [0u8; 32];
        k.digest_into(&mut dk);
        s.digest_into(&mut ds);
        assert_ne!(dk, ds);
    }

    #[test]
    fn short_output_truncates() {
        let mut ctx = HashContext::sha256();
        ctx.write(b"abc");
        let mut full = [0u8; 32];
        let mut short = [0u8; 8];
        ctx.digest_into(&mut full);
        ctx.digest_into(&mut short);
        assert_eq!(short, full[..8]);
    }
}
