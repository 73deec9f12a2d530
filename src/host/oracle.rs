//! The block-header oracle consumed from the node.

use crate::types::ids::Height;
use contract_vm_derive::BinaryCodec;
use std::collections::BTreeMap;

/// Compact header view written by `get_HdrInfo`.
#[derive(Clone, Debug, Default, PartialEq, Eq, BinaryCodec)]
pub struct HeaderInfo {
    pub height: u64,
    pub timestamp: u64,
    pub hash: [u8; 32],
}

/// Full header view written by `get_HdrFull`.
#[derive(Clone, Debug, Default, PartialEq, Eq, BinaryCodec)]
pub struct HeaderFull {
    pub height: u64,
    pub timestamp: u64,
    pub prev: [u8; 32],
    pub kernels_root: [u8; 32],
    pub definition: [u8; 32],
    pub hash: [u8; 32],
}

impl HeaderFull {
    /// The compact view of this header.
    pub fn info(&self) -> HeaderInfo {
        HeaderInfo {
            height: self.height,
            timestamp: self.timestamp,
            hash: self.hash,
        }
    }
}

/// Chain state the virtual machine may query. Supplied by the node; the VM
/// only marshals the answers into contract memory. Proof-of-work
/// verification lives here too because its rules belong to the consensus
/// layer, not to the machine.
pub trait ChainOracle {
    /// Current chain tip height.
    fn height(&self) -> Height;

    /// Header at the given height, if within the chain.
    fn header_at(&self, height: Height) -> Option<HeaderFull>;

    /// Consensus-rules configuration hash active at the given height, plus
    /// the height it activated at.
    fn rules_cfg(&self, height: Height) -> ([u8; 32], Height);

    /// Verifies a proof-of-work solution over `input` and `nonce`.
    fn verify_pow(&self, input: &[u8], nonce: &[u8], solution: &[u8]) -> bool;
}

/// A fixed in-memory oracle for wallet-side simulation and tests.
///
/// Its proof-of-work rule is a mock: a solution is valid when it equals the
/// personalized Blake2b digest of `input ∥ nonce`, which lets callers mint
/// valid solutions with [`StaticOracle::mock_pow_solution`].
#[derive(Default)]
pub struct StaticOracle {
    pub tip: Height,
    pub headers: BTreeMap<Height, HeaderFull>,
    pub rules: [u8; 32],
}

impl StaticOracle {
    /// An oracle at the given tip with simple synthetic headers.
    pub fn at_height(tip: Height) -> Self {
        let mut headers = BTreeMap::new();
        for h in 0..=tip {
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&h.to_le_bytes());
            headers.insert(
                h,
                HeaderFull {
                    height: h,
                    timestamp: 1600_000_000 + h * 60,
                    prev: [0; 32],
                    kernels_root: [0; 32],
                    definition: [0; 32],
                    hash,
                },
            );
        }
        Self {
            tip,
            headers,
            rules: [0; 32],
        }
    }

    /// The solution [`verify_pow`](ChainOracle::verify_pow) accepts for the
    /// given input and nonce.
    pub fn mock_pow_solution(input: &[u8], nonce: &[u8]) -> Vec<u8> {
        blake2b_simd::Params::new()
            .hash_length(32)
            .personal(b"cvm.pow.mock")
            .to_state()
            .update(input)
            .update(nonce)
            .finalize()
            .as_bytes()
            .to_vec()
    }
}

impl ChainOracle for StaticOracle {
    fn height(&self) -> Height {
        self.tip
    }

    fn header_at(&self, height: Height) -> Option<HeaderFull> {
        self.headers.get(&height).cloned()
    }

    fn rules_cfg(&self, _height: Height) -> ([u8; 32], Height) {
        (self.rules, 0)
    }

    fn verify_pow(&self, input: &[u8], nonce: &[u8], solution: &[u8]) -> bool {
        solution == Self::mock_pow_solution(input, nonce).as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_oracle_serves_headers_up_to_tip() {
        let oracle = StaticOracle::at_height(10);
        assert_eq!(oracle.height(), 10);
        assert!(oracle.header_at(10).is_some());
        assert!(oracle.header_at(11).is_none());
    }

    #[test]
    fn header_info_projection() {
        let oracle = StaticOracle::at_height(3);
        let full = oracle.header_at(2).unwrap();
        let info = full.info();
        assert_eq!(info.height, 2);
        assert_eq!(info.hash, full.hash);
    }

    #[test]
    fn mock_pow_roundtrip() {
        let oracle = StaticOracle::at_height(1);
        let solution = StaticOracle::mock_pow_solution(b"in", b"nonce");
        assert!(oracle.verify_pow(b"in", b"nonce", &solution));
        assert!(!oracle.verify_pow(b"in", b"other", &solution));
    }
}
