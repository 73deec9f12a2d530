//! Chain-level identifiers and scalar quantities.

use contract_vm_derive::BinaryCodec;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a contract identifier in bytes.
pub const CONTRACT_ID_LEN: usize = 32;

/// Asset identifier. Asset 0 is the native coin.
pub type AssetId = u32;

/// Amount of an asset, in minimal units.
pub type Amount = u64;

/// Block height.
pub type Height = u64;

/// Unique identifier of a deployed contract.
///
/// Derived from the contract bytecode and its constructor arguments, so the
/// same (code, args) pair always lands at the same address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BinaryCodec)]
pub struct ContractId(pub [u8; CONTRACT_ID_LEN]);

impl ContractId {
    /// Creates a zero-valued identifier.
    ///
    /// Reserved as the system namespace (asset registry bookkeeping).
    pub const fn zero() -> ContractId {
        ContractId([0u8; CONTRACT_ID_LEN])
    }

    /// Returns the identifier as a byte slice.
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates an identifier from a byte slice.
    ///
    /// Returns `None` if the slice length is not exactly [`CONTRACT_ID_LEN`].
    pub fn from_slice(slice: &[u8]) -> Option<ContractId> {
        if slice.len() != CONTRACT_ID_LEN {
            return None;
        }
        let mut bytes = [0u8; CONTRACT_ID_LEN];
        bytes.copy_from_slice(slice);
        Some(ContractId(bytes))
    }

    /// Derives the identifier of a contract from its bytecode and
    /// constructor arguments.
    pub fn derive(body: &[u8], ctor_args: &[u8]) -> ContractId {
        let mut hasher = Sha256::new();
        hasher.update(b"cvm.cid");
        hasher.update((body.len() as u32).to_le_bytes());
        hasher.update(body);
        hasher.update((ctor_args.len() as u32).to_le_bytes());
        hasher.update(ctor_args);
        ContractId(hasher.finalize().into())
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = ContractId::derive(b"code", b"args");
        let b = ContractId::derive(b"code", b"args");
        assert_eq!(a, b);
    }

    #[test]
    fn derive_separates_code_and_args() {
        // The length prefixes keep (code, args) boundaries unambiguous.
        let a = ContractId::derive(b"ab", b"c");
        let b = ContractId::derive(b"a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(ContractId::from_slice(&[0u8; 31]).is_none());
        assert!(ContractId::from_slice(&[0u8; 32]).is_some());
    }

    #[test]
    fn display_is_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        assert!(ContractId(bytes).to_string().starts_with("ab00"));
    }
}
