//! The host binding catalog.
//!
//! Imports resolve against this fixed table at compile time; at runtime the
//! `call_ext` instruction carries only the numeric binding id. Argument
//! counts and widths are a property of the binding, checked once during
//! compilation, never at dispatch.

use crate::compiler::image::FuncType;
use crate::vm::ops::value_type::{I32, I64};

/// Execution mode. Selects which part of the catalog a module may import
/// and which side effects its host permits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// On-chain contract execution with persistent effects.
    Contract,
    /// Off-chain read-only simulation for wallet tooling.
    Manager,
}

/// One entry of the host catalog.
#[derive(Debug)]
pub struct Binding {
    pub id: u32,
    pub name: &'static str,
    pub args: &'static [u8],
    pub ret: Option<u8>,
    /// Fixed charge debited before dispatch.
    pub charge: u64,
}

impl Binding {
    /// Whether a module-declared function type matches this binding.
    pub fn signature_matches(&self, ty: &FuncType) -> bool {
        ty.args == self.args && ty.ret == self.ret
    }
}

/// Numeric binding ids, shared between the catalog and the dispatchers.
pub mod ids {
    pub const MEMCPY: u32 = 0x10;
    pub const MEMSET: u32 = 0x11;
    pub const MEMCMP: u32 = 0x12;
    pub const MEMIS0: u32 = 0x13;
    pub const STRLEN: u32 = 0x14;
    pub const STRCMP: u32 = 0x15;
    pub const STACK_ALLOC: u32 = 0x18;
    pub const STACK_FREE: u32 = 0x19;
    pub const HEAP_ALLOC: u32 = 0x1A;
    pub const HEAP_FREE: u32 = 0x1B;
    pub const LOAD_VAR: u32 = 0x20;
    pub const SAVE_VAR: u32 = 0x21;
    pub const CALL_FAR: u32 = 0x23;
    pub const GET_CALL_DEPTH: u32 = 0x24;
    pub const GET_CALLER_CID: u32 = 0x25;
    pub const HALT: u32 = 0x28;
    pub const ADD_SIG: u32 = 0x29;
    pub const HASH_WRITE: u32 = 0x2B;
    pub const HASH_GET_VALUE: u32 = 0x2D;
    pub const HASH_FREE: u32 = 0x2E;
    pub const FUNDS_LOCK: u32 = 0x30;
    pub const FUNDS_UNLOCK: u32 = 0x31;
    pub const REF_ADD: u32 = 0x32;
    pub const REF_RELEASE: u32 = 0x33;
    pub const ASSET_CREATE: u32 = 0x38;
    pub const ASSET_EMIT: u32 = 0x39;
    pub const ASSET_DESTROY: u32 = 0x3A;
    pub const GET_HEIGHT: u32 = 0x40;
    pub const GET_HDR_INFO: u32 = 0x41;
    pub const GET_HDR_FULL: u32 = 0x42;
    pub const GET_RULES_CFG: u32 = 0x43;
    pub const HASH_CREATE_SHA256: u32 = 0x48;
    pub const HASH_CREATE_BLAKE2B: u32 = 0x49;
    pub const HASH_CREATE_KECCAK256: u32 = 0x4A;
    pub const VARS_ENUM: u32 = 0x51;
    pub const VARS_MOVE_NEXT: u32 = 0x52;
    pub const DERIVE_PK: u32 = 0x58;
    pub const DOC_ADD_GROUP: u32 = 0x60;
    pub const DOC_CLOSE_GROUP: u32 = 0x61;
    pub const DOC_ADD_TEXT: u32 = 0x62;
    pub const DOC_ADD_NUM32: u32 = 0x63;
    pub const DOC_ADD_NUM64: u32 = 0x64;
    pub const DOC_ADD_ARRAY: u32 = 0x65;
    pub const DOC_CLOSE_ARRAY: u32 = 0x66;
    pub const DOC_ADD_BLOB: u32 = 0x67;
    pub const DOC_GET_TEXT: u32 = 0x69;
    pub const DOC_GET_NUM32: u32 = 0x6A;
    pub const DOC_GET_NUM64: u32 = 0x6B;
    pub const DOC_GET_BLOB: u32 = 0x6C;
    pub const GENERATE_KERNEL: u32 = 0x70;
    pub const SECP_SCALAR_ALLOC: u32 = 0x80;
    pub const SECP_SCALAR_FREE: u32 = 0x81;
    pub const SECP_SCALAR_IMPORT: u32 = 0x82;
    pub const SECP_SCALAR_EXPORT: u32 = 0x83;
    pub const SECP_SCALAR_NEG: u32 = 0x84;
    pub const SECP_SCALAR_ADD: u32 = 0x85;
    pub const SECP_SCALAR_MUL: u32 = 0x86;
    pub const SECP_SCALAR_INV: u32 = 0x87;
    pub const SECP_SCALAR_SET: u32 = 0x88;
    pub const SECP_POINT_ALLOC: u32 = 0x90;
    pub const SECP_POINT_FREE: u32 = 0x91;
    pub const SECP_POINT_IMPORT: u32 = 0x92;
    pub const SECP_POINT_EXPORT: u32 = 0x93;
    pub const SECP_POINT_NEG: u32 = 0x94;
    pub const SECP_POINT_ADD: u32 = 0x95;
    pub const SECP_POINT_MUL: u32 = 0x96;
    pub const SECP_POINT_IS_ZERO: u32 = 0x97;
    pub const SECP_POINT_MUL_G: u32 = 0x98;
    pub const SECP_POINT_MUL_J: u32 = 0x99;
    pub const SECP_POINT_MUL_H: u32 = 0x9A;
    pub const VERIFY_BEAM_HASH_III: u32 = 0xB0;
}

use ids::*;

/// Bindings available in both modes.
static COMMON: &[Binding] = &[
    Binding { id: MEMCPY, name: "Memcpy", args: &[I32, I32, I32], ret: Some(I32), charge: 5 },
    Binding { id: MEMSET, name: "Memset", args: &[I32, I32, I32], ret: Some(I32), charge: 5 },
    Binding { id: MEMCMP, name: "Memcmp", args: &[I32, I32, I32], ret: Some(I32), charge: 5 },
    Binding { id: MEMIS0, name: "Memis0", args: &[I32, I32], ret: Some(I32), charge: 5 },
    Binding { id: STRLEN, name: "Strlen", args: &[I32], ret: Some(I32), charge: 5 },
    Binding { id: STRCMP, name: "Strcmp", args: &[I32, I32], ret: Some(I32), charge: 5 },
    Binding { id: STACK_ALLOC, name: "StackAlloc", args: &[I32], ret: Some(I32), charge: 2 },
    Binding { id: STACK_FREE, name: "StackFree", args: &[I32], ret: None, charge: 2 },
    Binding { id: HEAP_ALLOC, name: "HeapAlloc", args: &[I32], ret: Some(I32), charge: 30 },
    Binding { id: HEAP_FREE, name: "HeapFree", args: &[I32], ret: None, charge: 10 },
    Binding { id: HALT, name: "Halt", args: &[], ret: None, charge: 1 },
    Binding { id: HASH_WRITE, name: "HashWrite", args: &[I32, I32, I32], ret: None, charge: 10 },
    Binding { id: HASH_GET_VALUE, name: "HashGetValue", args: &[I32, I32, I32], ret: None, charge: 20 },
    Binding { id: HASH_FREE, name: "HashFree", args: &[I32], ret: None, charge: 2 },
    Binding { id: GET_HEIGHT, name: "get_Height", args: &[], ret: Some(I64), charge: 5 },
    Binding { id: GET_HDR_INFO, name: "get_HdrInfo", args: &[I32], ret: None, charge: 50 },
    Binding { id: GET_HDR_FULL, name: "get_HdrFull", args: &[I32], ret: None, charge: 50 },
    Binding { id: GET_RULES_CFG, name: "get_RulesCfg", args: &[I64, I32], ret: Some(I64), charge: 50 },
    Binding { id: HASH_CREATE_SHA256, name: "HashCreateSha256", args: &[], ret: Some(I32), charge: 40 },
    Binding { id: HASH_CREATE_BLAKE2B, name: "HashCreateBlake2b", args: &[I32, I32, I32], ret: Some(I32), charge: 40 },
    Binding { id: HASH_CREATE_KECCAK256, name: "HashCreateKeccak256", args: &[], ret: Some(I32), charge: 40 },
    Binding { id: SECP_SCALAR_ALLOC, name: "Secp_Scalar_alloc", args: &[], ret: Some(I32), charge: 20 },
    Binding { id: SECP_SCALAR_FREE, name: "Secp_Scalar_free", args: &[I32], ret: None, charge: 2 },
    Binding { id: SECP_SCALAR_IMPORT, name: "Secp_Scalar_import", args: &[I32, I32], ret: Some(I32), charge: 50 },
    Binding { id: SECP_SCALAR_EXPORT, name: "Secp_Scalar_export", args: &[I32, I32], ret: None, charge: 50 },
    Binding { id: SECP_SCALAR_NEG, name: "Secp_Scalar_neg", args: &[I32, I32], ret: None, charge: 50 },
    Binding { id: SECP_SCALAR_ADD, name: "Secp_Scalar_add", args: &[I32, I32, I32], ret: None, charge: 50 },
    Binding { id: SECP_SCALAR_MUL, name: "Secp_Scalar_mul", args: &[I32, I32, I32], ret: None, charge: 100 },
    Binding { id: SECP_SCALAR_INV, name: "Secp_Scalar_inv", args: &[I32, I32], ret: None, charge: 500 },
    Binding { id: SECP_SCALAR_SET, name: "Secp_Scalar_set", args: &[I32, I64], ret: None, charge: 20 },
    Binding { id: SECP_POINT_ALLOC, name: "Secp_Point_alloc", args: &[], ret: Some(I32), charge: 20 },
    Binding { id: SECP_POINT_FREE, name: "Secp_Point_free", args: &[I32], ret: None, charge: 2 },
    Binding { id: SECP_POINT_IMPORT, name: "Secp_Point_Import", args: &[I32, I32], ret: Some(I32), charge: 500 },
    Binding { id: SECP_POINT_EXPORT, name: "Secp_Point_Export", args: &[I32, I32], ret: None, charge: 500 },
    Binding { id: SECP_POINT_NEG, name: "Secp_Point_neg", args: &[I32, I32], ret: None, charge: 300 },
    Binding { id: SECP_POINT_ADD, name: "Secp_Point_add", args: &[I32, I32, I32], ret: None, charge: 300 },
    Binding { id: SECP_POINT_MUL, name: "Secp_Point_mul", args: &[I32, I32, I32], ret: None, charge: 2000 },
    Binding { id: SECP_POINT_IS_ZERO, name: "Secp_Point_IsZero", args: &[I32], ret: Some(I32), charge: 20 },
    Binding { id: SECP_POINT_MUL_G, name: "Secp_Point_mul_G", args: &[I32, I32], ret: None, charge: 1500 },
    Binding { id: SECP_POINT_MUL_J, name: "Secp_Point_mul_J", args: &[I32, I32], ret: None, charge: 2000 },
    Binding { id: SECP_POINT_MUL_H, name: "Secp_Point_mul_H", args: &[I32, I32, I32], ret: None, charge: 2000 },
    Binding { id: VERIFY_BEAM_HASH_III, name: "VerifyBeamHashIII", args: &[I32, I32, I32, I32, I32, I32], ret: Some(I32), charge: 10_000 },
];

/// Bindings available to on-chain contracts only.
static CONTRACT: &[Binding] = &[
    Binding { id: LOAD_VAR, name: "LoadVar", args: &[I32, I32, I32, I32, I32], ret: Some(I32), charge: 50 },
    Binding { id: SAVE_VAR, name: "SaveVar", args: &[I32, I32, I32, I32, I32], ret: Some(I32), charge: 200 },
    Binding { id: CALL_FAR, name: "CallFar", args: &[I32, I32, I32, I32], ret: None, charge: 250 },
    Binding { id: GET_CALL_DEPTH, name: "get_CallDepth", args: &[], ret: Some(I32), charge: 1 },
    Binding { id: GET_CALLER_CID, name: "get_CallerCid", args: &[I32, I32], ret: None, charge: 5 },
    Binding { id: ADD_SIG, name: "AddSig", args: &[I32], ret: None, charge: 400 },
    Binding { id: FUNDS_LOCK, name: "FundsLock", args: &[I32, I64], ret: None, charge: 50 },
    Binding { id: FUNDS_UNLOCK, name: "FundsUnlock", args: &[I32, I64], ret: None, charge: 50 },
    Binding { id: REF_ADD, name: "RefAdd", args: &[I32], ret: Some(I32), charge: 100 },
    Binding { id: REF_RELEASE, name: "RefRelease", args: &[I32], ret: Some(I32), charge: 100 },
    Binding { id: ASSET_CREATE, name: "AssetCreate", args: &[I32, I32], ret: Some(I32), charge: 2000 },
    Binding { id: ASSET_EMIT, name: "AssetEmit", args: &[I32, I64, I32], ret: Some(I32), charge: 500 },
    Binding { id: ASSET_DESTROY, name: "AssetDestroy", args: &[I32], ret: Some(I32), charge: 500 },
];

/// Bindings available to wallet-side manager modules only. `LoadVar` appears
/// here as well because manager code may read (never write) the store.
static MANAGER: &[Binding] = &[
    Binding { id: LOAD_VAR, name: "LoadVar", args: &[I32, I32, I32, I32, I32], ret: Some(I32), charge: 50 },
    Binding { id: VARS_ENUM, name: "VarsEnum", args: &[I32, I32, I32, I32], ret: None, charge: 100 },
    Binding { id: VARS_MOVE_NEXT, name: "VarsMoveNext", args: &[I32, I32, I32, I32], ret: Some(I32), charge: 50 },
    Binding { id: DERIVE_PK, name: "DerivePk", args: &[I32, I32, I32], ret: None, charge: 1000 },
    Binding { id: DOC_ADD_GROUP, name: "DocAddGroup", args: &[I32], ret: None, charge: 10 },
    Binding { id: DOC_CLOSE_GROUP, name: "DocCloseGroup", args: &[], ret: None, charge: 10 },
    Binding { id: DOC_ADD_TEXT, name: "DocAddText", args: &[I32, I32], ret: None, charge: 10 },
    Binding { id: DOC_ADD_NUM32, name: "DocAddNum32", args: &[I32, I32], ret: None, charge: 10 },
    Binding { id: DOC_ADD_NUM64, name: "DocAddNum64", args: &[I32, I64], ret: None, charge: 10 },
    Binding { id: DOC_ADD_ARRAY, name: "DocAddArray", args: &[I32], ret: None, charge: 10 },
    Binding { id: DOC_CLOSE_ARRAY, name: "DocCloseArray", args: &[], ret: None, charge: 10 },
    Binding { id: DOC_ADD_BLOB, name: "DocAddBlob", args: &[I32, I32, I32], ret: None, charge: 20 },
    Binding { id: DOC_GET_TEXT, name: "DocGetText", args: &[I32, I32, I32], ret: Some(I32), charge: 10 },
    Binding { id: DOC_GET_NUM32, name: "DocGetNum32", args: &[I32, I32], ret: Some(I32), charge: 10 },
    Binding { id: DOC_GET_NUM64, name: "DocGetNum64", args: &[I32, I32], ret: Some(I32), charge: 10 },
    Binding { id: DOC_GET_BLOB, name: "DocGetBlob", args: &[I32, I32, I32], ret: Some(I32), charge: 20 },
    Binding { id: GENERATE_KERNEL, name: "GenerateKernel", args: &[I32, I32, I32, I32, I32, I32, I32, I32, I32, I32], ret: None, charge: 100 },
];

/// All host imports live in this module namespace.
pub const HOST_MODULE: &str = "env";

/// Looks up a binding by import name for the given execution mode.
pub fn resolve(kind: Kind, module: &str, name: &str) -> Option<&'static Binding> {
    if module != HOST_MODULE {
        return None;
    }
    let mode_table = match kind {
        Kind::Contract => CONTRACT,
        Kind::Manager => MANAGER,
    };
    COMMON
        .iter()
        .chain(mode_table.iter())
        .find(|b| b.name == name)
}

/// The fixed charge of a binding id in the given mode, if it exists there.
pub fn charge_of(kind: Kind, id: u32) -> Option<u64> {
    let mode_table = match kind {
        Kind::Contract => CONTRACT,
        Kind::Manager => MANAGER,
    };
    COMMON
        .iter()
        .chain(mode_table.iter())
        .find(|b| b.id == id)
        .map(|b| b.charge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_requires_env_module() {
        assert!(resolve(Kind::Contract, "env", "Memcpy").is_some());
        assert!(resolve(Kind::Contract, "host", "Memcpy").is_none());
    }

    #[test]
    fn contract_bindings_hidden_from_manager() {
        assert!(resolve(Kind::Contract, "env", "SaveVar").is_some());
        assert!(resolve(Kind::Manager, "env", "SaveVar").is_none());
    }

    #[test]
    fn manager_bindings_hidden_from_contract() {
        assert!(resolve(Kind::Manager, "env", "DocAddGroup").is_some());
        assert!(resolve(Kind::Contract, "env", "DocAddGroup").is_none());
    }

    #[test]
    fn load_var_available_in_both_modes() {
        assert!(resolve(Kind::Contract, "env", "LoadVar").is_some());
        assert!(resolve(Kind::Manager, "env", "LoadVar").is_some());
    }

    #[test]
    fn signature_matching() {
        let b = resolve(Kind::Contract, "env", "FundsLock").unwrap();
        let good = FuncType { args: vec![I32, I64], ret: None };
        let bad = FuncType { args: vec![I32, I32], ret: None };
        assert!(b.signature_matches(&good));
        assert!(!b.signature_matches(&bad));
    }

    #[test]
    fn ids_are_unique_within_a_mode() {
        for table in [CONTRACT, MANAGER] {
            let mut ids: Vec<u32> = COMMON.iter().chain(table).map(|b| b.id).collect();
            ids.sort_unstable();
            let before = ids.len();
            ids.dedup();
            assert_eq!(before, ids.len());
        }
    }
}
