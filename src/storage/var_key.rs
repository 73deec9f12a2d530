//! Variable store keys.
//!
//! Every persisted variable lives under `contract_id ∥ tag ∥ user_key`. The
//! tag byte partitions a contract's namespace; the bare 32-byte contract id
//! (no tag) addresses the contract registry entry holding the bytecode body.

use crate::types::ids::{ContractId, CONTRACT_ID_LEN};

/// Maximum user-key length in bytes.
pub const USER_KEY_MAX: usize = 256;

const BUF_LEN: usize = CONTRACT_ID_LEN + 1 + USER_KEY_MAX;

/// Namespace tag inside a contract's key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// User data written through `SaveVar`.
    Internal = 0,
    /// Per-asset locked balance.
    LockedAmount = 1,
    /// Inter-contract reference counter.
    Refs = 2,
    /// Asset ownership record.
    OwnedAsset = 3,
}

impl Tag {
    /// Decodes a tag byte as carried by the `LoadVar`/`SaveVar` bindings.
    pub fn from_u8(value: u8) -> Option<Tag> {
        match value {
            0 => Some(Tag::Internal),
            1 => Some(Tag::LockedAmount),
            2 => Some(Tag::Refs),
            3 => Some(Tag::OwnedAsset),
            _ => None,
        }
    }
}

/// A fully-formed variable store key.
#[derive(Clone, Copy)]
pub struct VarKey {
    buf: [u8; BUF_LEN],
    len: usize,
}

impl VarKey {
    /// The registry key of a contract: the bare contract id, no tag byte.
    pub fn registry(cid: &ContractId) -> VarKey {
        let mut buf = [0u8; BUF_LEN];
        buf[..CONTRACT_ID_LEN].copy_from_slice(cid.as_slice());
        VarKey {
            buf,
            len: CONTRACT_ID_LEN,
        }
    }

    /// A tagged key inside the contract's namespace.
    ///
    /// Returns `None` when the user portion exceeds [`USER_KEY_MAX`].
    pub fn tagged(cid: &ContractId, tag: Tag, user: &[u8]) -> Option<VarKey> {
        if user.len() > USER_KEY_MAX {
            return None;
        }
        let mut buf = [0u8; BUF_LEN];
        buf[..CONTRACT_ID_LEN].copy_from_slice(cid.as_slice());
        buf[CONTRACT_ID_LEN] = tag as u8;
        buf[CONTRACT_ID_LEN + 1..CONTRACT_ID_LEN + 1 + user.len()].copy_from_slice(user);
        Some(VarKey {
            buf,
            len: CONTRACT_ID_LEN + 1 + user.len(),
        })
    }

    /// The key bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl AsRef<[u8]> for VarKey {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(b: u8) -> ContractId {
        ContractId([b; CONTRACT_ID_LEN])
    }

    #[test]
    fn registry_key_is_bare_cid() {
        let key = VarKey::registry(&cid(0xAA));
        assert_eq!(key.as_slice(), &[0xAA; 32]);
    }

    #[test]
    fn tagged_key_layout() {
        let key = VarKey::tagged(&cid(0x11), Tag::Internal, b"c").unwrap();
        assert_eq!(key.as_slice().len(), 32 + 1 + 1);
        assert_eq!(key.as_slice()[32], 0);
        assert_eq!(key.as_slice()[33], b'c');
    }

    #[test]
    fn tags_partition_namespace() {
        let a = VarKey::tagged(&cid(1), Tag::Internal, b"x").unwrap();
        let b = VarKey::tagged(&cid(1), Tag::Refs, b"x").unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn oversized_user_key_rejected() {
        let user = [0u8; USER_KEY_MAX + 1];
        assert!(VarKey::tagged(&cid(1), Tag::Internal, &user).is_none());
        let user = [0u8; USER_KEY_MAX];
        assert!(VarKey::tagged(&cid(1), Tag::Internal, &user).is_some());
    }

    #[test]
    fn registry_key_differs_from_tagged_keys() {
        let reg = VarKey::registry(&cid(1));
        let tagged = VarKey::tagged(&cid(1), Tag::Internal, b"").unwrap();
        assert_ne!(reg.as_slice(), tagged.as_slice());
    }
}
