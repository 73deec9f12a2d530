//! Manager-mode host: read-only, off-chain simulation for wallet tooling.
//!
//! A manager module drives the same interpreter as a contract but binds a
//! different table: no persistence, no funds movement, no signature
//! accumulation. Instead it can walk the variable store, derive wallet
//! subkeys, emit a structured document for the UI and produce
//! transaction-kernel blueprints for the wallet to fund and sign. The
//! charge meter still runs, purely for profiling.

use crate::compiler;
use crate::crypto::secp::{self, PubKey};
use crate::host::bindings::{self, ids, Kind};
use crate::host::common::{self, write_struct, CommonState};
use crate::host::oracle::ChainOracle;
use crate::storage::store::VariableStore;
use crate::storage::var_key::{Tag, VarKey};
use crate::types::encoding::Decode;
use crate::types::ids::ContractId;
use crate::vm::charge::ChargeCategory;
use crate::vm::errors::Fault;
use crate::vm::processor::{HostAbi, Processor};
use crate::vm::Limits;
use contract_vm_derive::BinaryCodec;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// One funds delta inside a kernel blueprint, as laid out in VM memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct FundsChange {
    pub aid: u32,
    pub amount: u64,
    /// Non-zero locks (pays into the contract), zero unlocks.
    pub lock: u8,
}

/// A transaction-kernel blueprint produced by `GenerateKernel`. The wallet
/// turns it into an actual kernel, funding the deltas and signing with the
/// requested keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBlueprint {
    /// Target contract; `None` for a deployment kernel.
    pub cid: Option<ContractId>,
    pub method: u32,
    pub args: Vec<u8>,
    pub funds: Vec<FundsChange>,
    /// Key ids the wallet must sign with.
    pub sig_keys: Vec<[u8; 32]>,
    pub comment: String,
    pub charge: u32,
}

/// Structured JSON output accumulated through the `Doc*` bindings.
struct DocBuilder {
    out: String,
    need_comma: bool,
}

impl DocBuilder {
    fn new() -> Self {
        Self {
            out: String::from("{"),
            need_comma: false,
        }
    }

    fn next(&mut self) {
        if self.need_comma {
            self.out.push(',');
        }
        self.need_comma = false;
    }

    /// Writes `"id": ` unless the id is empty (array elements carry none).
    fn key(&mut self, id: &str) {
        self.next();
        if !id.is_empty() {
            self.out.push('"');
            self.escape_into(id);
            self.out.push_str("\": ");
        }
    }

    fn escape_into(&mut self, s: &str) {
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
    }

    fn open_group(&mut self, id: &str) {
        self.key(id);
        self.out.push('{');
    }

    fn close_group(&mut self) {
        self.out.push('}');
        self.need_comma = true;
    }

    fn open_array(&mut self, id: &str) {
        self.key(id);
        self.out.push('[');
    }

    fn close_array(&mut self) {
        self.out.push(']');
        self.need_comma = true;
    }

    fn add_text(&mut self, id: &str, value: &str) {
        self.key(id);
        self.out.push('"');
        self.escape_into(value);
        self.out.push('"');
        self.need_comma = true;
    }

    fn add_num(&mut self, id: &str, value: u64) {
        self.key(id);
        self.out.push_str(&value.to_string());
        self.need_comma = true;
    }

    fn add_blob(&mut self, id: &str, blob: &[u8]) {
        self.key(id);
        self.out.push('"');
        for byte in blob {
            self.out.push_str(&format!("{:02x}", byte));
        }
        self.out.push('"');
        self.need_comma = true;
    }

    fn finish(mut self) -> String {
        self.out.push('}');
        self.out
    }
}

/// Result of one manager-module run.
#[derive(Debug)]
pub struct ManagerOutput {
    /// The emitted document (JSON).
    pub doc: String,
    /// Kernel blueprints the module generated.
    pub kernels: Vec<KernelBlueprint>,
    /// Charge consumed, for profiling only.
    pub charge: u64,
}

/// The manager-mode host environment.
pub struct ManagerHost<'a> {
    store: &'a dyn VariableStore,
    oracle: &'a dyn ChainOracle,
    common: CommonState,
    doc: DocBuilder,
    kernels: Vec<KernelBlueprint>,
    /// Invocation arguments the module reads back through `DocGet*`.
    args: BTreeMap<String, String>,
    /// Wallet master material for `DerivePk`.
    seed: Zeroizing<[u8; 32]>,
    /// The contract whose namespace `LoadVar` reads.
    ctx_cid: ContractId,
    /// Active `VarsEnum` snapshot and cursor position.
    vars_cursor: Option<(Vec<(Vec<u8>, Vec<u8>)>, usize)>,
}

impl<'a> ManagerHost<'a> {
    pub fn new(
        store: &'a dyn VariableStore,
        oracle: &'a dyn ChainOracle,
        ctx_cid: ContractId,
        args: BTreeMap<String, String>,
        seed: [u8; 32],
    ) -> Self {
        Self {
            store,
            oracle,
            common: CommonState::new(),
            doc: DocBuilder::new(),
            kernels: Vec::new(),
            args,
            seed: Zeroizing::new(seed),
            ctx_cid,
            vars_cursor: None,
        }
    }

    /// Compiles and runs one method of a manager module to completion.
    pub fn run(
        mut self,
        module: &[u8],
        method: u32,
        charge_ceiling: u64,
    ) -> Result<ManagerOutput, Fault> {
        let image = compiler::compile(module, Kind::Manager).map_err(Fault::NestedCompile)?;

        let mut proc = Processor::new(charge_ceiling);
        proc.enter_frame(self.ctx_cid, image, method, None)?;
        while !proc.is_done() {
            proc.step(&mut self)?;
        }

        Ok(ManagerOutput {
            doc: self.doc.finish(),
            kernels: self.kernels,
            charge: proc.charge().spent(),
        })
    }

    fn read_id(proc: &Processor, ptr: u32) -> Result<String, Fault> {
        let bytes = proc.memory().read_str(ptr)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Fault::MemoryBounds { addr: ptr, len: 0 })
    }

    /// Deterministic subkey derivation from the wallet master material.
    fn derive_pk(&self, id: &[u8]) -> PubKey {
        for counter in 0u32.. {
            let mut hasher = Sha256::new();
            hasher.update(b"cvm.kdf");
            hasher.update(self.seed.as_ref());
            hasher.update((id.len() as u32).to_le_bytes());
            hasher.update(id);
            hasher.update(counter.to_le_bytes());
            let candidate: [u8; 32] = hasher.finalize().into();
            if let Some(scalar) = secp::scalar_from_bytes(&candidate) {
                let point = secp::generator() * scalar;
                return secp::pubkey_from_point(&point);
            }
        }
        unreachable!("scalar derivation exhausted the u32 counter")
    }

    fn load_var(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_type = proc.pop_word()?;
        let n_val = proc.pop_word()?;
        let p_val = proc.pop_word()?;
        let n_key = proc.pop_word()?;
        let p_key = proc.pop_word()?;

        let tag = Tag::from_u8(n_type as u8).ok_or(Fault::BadVarTag(n_type as u8))?;
        if n_key > Limits::VAR_KEY_SIZE {
            return Err(Fault::VarKeyTooLong);
        }
        let key = proc.memory().read(p_key, n_key)?;
        let vk = VarKey::tagged(&self.ctx_cid, tag, key).ok_or(Fault::VarKeyTooLong)?;

        match self.store.load(vk.as_slice()) {
            Some(value) => {
                proc.charge_mut()
                    .pay(ChargeCategory::StateRead, value.len() as u64 / 8)?;
                let n = (n_val as usize).min(value.len());
                proc.memory_mut().write(p_val, &value[..n])?;
                proc.push_word(value.len() as u32)?;
            }
            None => proc.push_word(0)?,
        }
        Ok(())
    }

    fn vars_enum(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_max = proc.pop_word()?;
        let p_max = proc.pop_word()?;
        let n_min = proc.pop_word()?;
        let p_min = proc.pop_word()?;

        let min = proc.memory().read(p_min, n_min)?.to_vec();
        let max = proc.memory().read(p_max, n_max)?.to_vec();
        self.vars_cursor = Some((self.store.range(&min, &max), 0));
        Ok(())
    }

    fn vars_move_next(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let pn_val = proc.pop_word()?;
        let p_val = proc.pop_word()?;
        let pn_key = proc.pop_word()?;
        let p_key = proc.pop_word()?;

        let Some((entries, pos)) = &mut self.vars_cursor else {
            proc.push_word(0)?;
            return Ok(());
        };
        let Some((key, value)) = entries.get(*pos).cloned() else {
            self.vars_cursor = None;
            proc.push_word(0)?;
            return Ok(());
        };
        *pos += 1;

        // Each `pn` slot carries the buffer capacity in and the actual
        // length out; the copy is truncated to the capacity.
        for (ptr, len_ptr, bytes) in [(p_key, pn_key, &key), (p_val, pn_val, &value)] {
            let cap = u32::from_le_bytes(proc.memory().read_array::<4>(len_ptr)?);
            let n = (cap as usize).min(bytes.len());
            proc.memory_mut().write(ptr, &bytes[..n])?;
            proc.memory_mut()
                .write(len_ptr, &(bytes.len() as u32).to_le_bytes())?;
        }
        proc.push_word(1)
    }

    fn generate_kernel(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let charge = proc.pop_word()?;
        let p_comment = proc.pop_word()?;
        let n_sig = proc.pop_word()?;
        let p_sig = proc.pop_word()?;
        let n_funds = proc.pop_word()?;
        let p_funds = proc.pop_word()?;
        let n_arg = proc.pop_word()?;
        let p_arg = proc.pop_word()?;
        let method = proc.pop_word()?;
        let p_cid = proc.pop_word()?;

        let cid = if p_cid == 0 {
            None
        } else {
            Some(ContractId(proc.memory().read_array::<32>(p_cid)?))
        };
        let args = proc.memory().read(p_arg, n_arg)?.to_vec();

        const FUNDS_CHANGE_LEN: u32 = 13;
        let mut funds = Vec::with_capacity(n_funds as usize);
        for i in 0..n_funds {
            let raw = proc
                .memory()
                .read(p_funds + i * FUNDS_CHANGE_LEN, FUNDS_CHANGE_LEN)?;
            funds.push(
                FundsChange::from_bytes(raw).map_err(|_| Fault::MemoryBounds {
                    addr: p_funds,
                    len: FUNDS_CHANGE_LEN,
                })?,
            );
        }

        let mut sig_keys = Vec::with_capacity(n_sig as usize);
        for i in 0..n_sig {
            sig_keys.push(proc.memory().read_array::<32>(p_sig + i * 32)?);
        }

        let comment = Self::read_id(proc, p_comment)?;
        self.kernels.push(KernelBlueprint {
            cid,
            method,
            args,
            funds,
            sig_keys,
            comment,
            charge,
        });
        Ok(())
    }
}

impl HostAbi for ManagerHost<'_> {
    fn invoke_ext(&mut self, proc: &mut Processor, binding: u32) -> Result<(), Fault> {
        let charge = bindings::charge_of(Kind::Manager, binding)
            .ok_or(Fault::UnknownBinding(binding))?;
        proc.charge_mut().pay(ChargeCategory::HostCall, charge)?;

        if common::dispatch(proc, &mut self.common, self.oracle, binding)? {
            return Ok(());
        }

        match binding {
            ids::LOAD_VAR => self.load_var(proc),
            ids::VARS_ENUM => self.vars_enum(proc),
            ids::VARS_MOVE_NEXT => self.vars_move_next(proc),
            ids::DERIVE_PK => {
                let n_id = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let pk_ptr = proc.pop_word()?;
                let id = proc.memory().read(p_id, n_id)?.to_vec();
                let pk = self.derive_pk(&id);
                write_struct(proc, pk_ptr, &pk)?;
                Ok(())
            }
            ids::DOC_ADD_GROUP => {
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                self.doc.open_group(&id);
                Ok(())
            }
            ids::DOC_CLOSE_GROUP => {
                self.doc.close_group();
                Ok(())
            }
            ids::DOC_ADD_TEXT => {
                let p_val = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                let value = Self::read_id(proc, p_val)?;
                self.doc.add_text(&id, &value);
                Ok(())
            }
            ids::DOC_ADD_NUM32 => {
                let value = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                self.doc.add_num(&id, u64::from(value));
                Ok(())
            }
            ids::DOC_ADD_NUM64 => {
                let value = proc.pop_u64()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                self.doc.add_num(&id, value);
                Ok(())
            }
            ids::DOC_ADD_ARRAY => {
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                self.doc.open_array(&id);
                Ok(())
            }
            ids::DOC_CLOSE_ARRAY => {
                self.doc.close_array();
                Ok(())
            }
            ids::DOC_ADD_BLOB => {
                let n = proc.pop_word()?;
                let p = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                let blob = proc.memory().read(p, n)?.to_vec();
                self.doc.add_blob(&id, &blob);
                Ok(())
            }
            ids::DOC_GET_TEXT => {
                let cap = proc.pop_word()?;
                let dst = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                match self.args.get(&id) {
                    Some(value) => {
                        // Zero-terminated copy, truncated to the buffer.
                        let bytes = value.as_bytes();
                        let n = bytes.len().min(cap.saturating_sub(1) as usize);
                        proc.memory_mut().write(dst, &bytes[..n])?;
                        proc.memory_mut().store_u8(dst + n as u32, 0)?;
                        proc.push_word(bytes.len() as u32 + 1)
                    }
                    None => proc.push_word(0),
                }
            }
            ids::DOC_GET_NUM32 => {
                let out = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                match self.args.get(&id).and_then(|v| v.parse::<u32>().ok()) {
                    Some(value) => {
                        proc.memory_mut().write(out, &value.to_le_bytes())?;
                        proc.push_word(1)
                    }
                    None => proc.push_word(0),
                }
            }
            ids::DOC_GET_NUM64 => {
                let out = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                match self.args.get(&id).and_then(|v| v.parse::<u64>().ok()) {
                    Some(value) => {
                        proc.memory_mut().write(out, &value.to_le_bytes())?;
                        proc.push_word(1)
                    }
                    None => proc.push_word(0),
                }
            }
            ids::DOC_GET_BLOB => {
                let cap = proc.pop_word()?;
                let dst = proc.pop_word()?;
                let p_id = proc.pop_word()?;
                let id = Self::read_id(proc, p_id)?;
                match self.args.get(&id).and_then(|v| hex_decode(v)) {
                    Some(blob) => {
                        let n = blob.len().min(cap as usize);
                        proc.memory_mut().write(dst, &blob[..n])?;
                        proc.push_word(blob.len() as u32)
                    }
                    None => proc.push_word(0),
                }
            }
            ids::GENERATE_KERNEL => self.generate_kernel(proc),
            _ => Err(Fault::UnknownBinding(binding)),
        }
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_builder_produces_json_shape() {
        let mut doc = DocBuilder::new();
        doc.open_group("res");
        doc.add_text("name", "demo");
        doc.add_num("height", 42);
        doc.open_array("items");
        doc.open_group("");
        doc.add_num("id", 1);
        doc.close_group();
        doc.close_array();
        doc.close_group();
        assert_eq!(
            doc.finish(),
            r#"{"res": {"name": "demo","height": 42,"items": [{"id": 1}]}}"#
        );
    }

    #[test]
    fn doc_builder_escapes_text() {
        let mut doc = DocBuilder::new();
        doc.add_text("k", "a\"b\\c");
        assert_eq!(doc.finish(), r#"{"k": "a\"b\\c"}"#);
    }

    #[test]
    fn hex_decode_roundtrip() {
        assert_eq!(hex_decode("ab01"), Some(vec![0xAB, 0x01]));
        assert_eq!(hex_decode("xyz"), None);
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode(""), Some(vec![]));
    }

    #[test]
    fn funds_change_layout_is_13_bytes() {
        use crate::types::encoding::Encode;
        let fc = FundsChange {
            aid: 1,
            amount: 2,
            lock: 1,
        };
        assert_eq!(fc.to_bytes().len(), 13);
    }

    use crate::host::oracle::StaticOracle;
    use crate::storage::store::MemoryStore;
    use crate::test_utils::{sleb, uleb, ModuleBuilder};
    use crate::vm::ops::value_type::{I32, I64};

    fn host<'a>(
        store: &'a MemoryStore,
        oracle: &'a StaticOracle,
        args: BTreeMap<String, String>,
    ) -> ManagerHost<'a> {
        ManagerHost::new(store, oracle, ContractId::zero(), args, [7u8; 32])
    }

    /// Manager module emitting the chain height into the document and one
    /// kernel blueprint.
    fn report_module() -> Vec<u8> {
        let mut m = ModuleBuilder::new();
        let t_alloc = m.ty(&[I32], Some(I32));
        let t_height = m.ty(&[], Some(I64));
        let t_num64 = m.ty(&[I32, I64], None);
        let t_kernel = m.ty(&[I32; 10], None);
        let t_entry = m.ty(&[], None);
        let f_alloc = m.import("StackAlloc", t_alloc);
        let f_height = m.import("get_Height", t_height);
        let f_num = m.import("DocAddNum64", t_num64);
        let f_kernel = m.import("GenerateKernel", t_kernel);

        let mut b = Vec::new();
        // buf = StackAlloc(4); mem[buf] = 'h' (terminator already zero)
        b.extend([0x41]); b.extend(sleb(4));
        b.extend([0x10]); b.extend(uleb(f_alloc.into()));
        b.extend([0x21]); b.extend(uleb(0));
        b.extend([0x20]); b.extend(uleb(0));
        b.extend([0x41]); b.extend(sleb(i64::from(b'h')));
        b.extend([0x3A, 0x00, 0x00]);
        // DocAddNum64("h", get_Height())
        b.extend([0x20]); b.extend(uleb(0));
        b.extend([0x10]); b.extend(uleb(f_height.into()));
        b.extend([0x10]); b.extend(uleb(f_num.into()));
        // GenerateKernel(cid=0, method=2, args=(0,0), funds=(0,0),
        // sigs=(0,0), comment=buf+2 (empty string), charge=5)
        for v in [0i64, 2, 0, 0, 0, 0, 0, 0] {
            b.extend([0x41]);
            b.extend(sleb(v));
        }
        b.extend([0x20]); b.extend(uleb(0));
        b.extend([0x41]); b.extend(sleb(2));
        b.extend([0x6A]);
        b.extend([0x41]); b.extend(sleb(5));
        b.extend([0x10]); b.extend(uleb(f_kernel.into()));
        let f = m.func(t_entry, &[(1, I32)], &b);
        m.method(2, f);
        m.build()
    }

    #[test]
    fn manager_module_emits_document_and_kernel() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(42);
        let out = host(&store, &oracle, BTreeMap::new())
            .run(&report_module(), 2, 1_000_000)
            .unwrap();

        assert_eq!(out.doc, r#"{"h": 42}"#);
        assert!(out.charge > 0);
        assert_eq!(out.kernels.len(), 1);
        let kernel = &out.kernels[0];
        assert_eq!(kernel.cid, None);
        assert_eq!(kernel.method, 2);
        assert_eq!(kernel.charge, 5);
        assert!(kernel.funds.is_empty());
        assert!(kernel.sig_keys.is_empty());
    }

    #[test]
    fn manager_rejects_mutating_bindings() {
        let mut m = ModuleBuilder::new();
        let ty = m.ty(&[I32, I32, I32, I32, I32], Some(I32));
        m.import("SaveVar", ty);
        let err = host(&MemoryStore::new(), &StaticOracle::at_height(1), BTreeMap::new())
            .run(&m.build(), 2, 1_000_000)
            .unwrap_err();
        assert!(matches!(err, Fault::NestedCompile(_)));
    }

    #[test]
    fn vars_cursor_walks_a_snapshot() {
        let mut store = MemoryStore::new();
        store.save(b"aa", Some(b"1"));
        store.save(b"ab", Some(b"22"));
        store.save(b"zz", Some(b"3"));
        let oracle = StaticOracle::at_height(1);
        let mut h = host(&store, &oracle, BTreeMap::new());

        let mut proc = Processor::new(1_000_000);
        // min = "aa" at 100, max = "ax" at 110
        proc.memory_mut().write(100, b"aa").unwrap();
        proc.memory_mut().write(110, b"ax").unwrap();
        proc.push_word(100).unwrap();
        proc.push_word(2).unwrap();
        proc.push_word(110).unwrap();
        proc.push_word(2).unwrap();
        h.vars_enum(&mut proc).unwrap();

        // Capacity slots at 200 (key) and 210 (value), buffers at 220/240.
        let mut next = |proc: &mut Processor| -> u32 {
            proc.memory_mut().write(200, &16u32.to_le_bytes()).unwrap();
            proc.memory_mut().write(210, &16u32.to_le_bytes()).unwrap();
            proc.push_word(220).unwrap();
            proc.push_word(200).unwrap();
            proc.push_word(240).unwrap();
            proc.push_word(210).unwrap();
            h.vars_move_next(proc).unwrap();
            proc.pop_word().unwrap()
        };

        assert_eq!(next(&mut proc), 1);
        assert_eq!(proc.memory().read(220, 2).unwrap(), b"aa");
        assert_eq!(proc.memory().read(240, 1).unwrap(), b"1");

        assert_eq!(next(&mut proc), 1);
        assert_eq!(proc.memory().read(220, 2).unwrap(), b"ab");
        let val_len = u32::from_le_bytes(proc.memory().read_array::<4>(210).unwrap());
        assert_eq!(val_len, 2);

        // "zz" is outside the range: the cursor ends.
        assert_eq!(next(&mut proc), 0);
    }

    #[test]
    fn doc_get_reads_invocation_args() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let mut args = BTreeMap::new();
        args.insert("n".to_string(), "42".to_string());
        args.insert("blob".to_string(), "ab01".to_string());
        let mut h = host(&store, &oracle, args);

        let mut proc = Processor::new(1_000_000);
        proc.memory_mut().write(100, b"n\0").unwrap();
        proc.push_word(100).unwrap();
        proc.push_word(200).unwrap();
        h.invoke_ext(&mut proc, ids::DOC_GET_NUM32).unwrap();
        assert_eq!(proc.pop_word().unwrap(), 1);
        assert_eq!(
            u32::from_le_bytes(proc.memory().read_array::<4>(200).unwrap()),
            42
        );

        // Unknown id reports failure.
        proc.memory_mut().write(110, b"z\0").unwrap();
        proc.push_word(110).unwrap();
        proc.push_word(200).unwrap();
        h.invoke_ext(&mut proc, ids::DOC_GET_NUM32).unwrap();
        assert_eq!(proc.pop_word().unwrap(), 0);

        // Blob arguments arrive hex-encoded.
        proc.memory_mut().write(120, b"blob\0").unwrap();
        proc.push_word(120).unwrap();
        proc.push_word(300).unwrap();
        proc.push_word(8).unwrap();
        h.invoke_ext(&mut proc, ids::DOC_GET_BLOB).unwrap();
        assert_eq!(proc.pop_word().unwrap(), 2);
        assert_eq!(proc.memory().read(300, 2).unwrap(), &[0xAB, 0x01]);
    }

    #[test]
    fn derive_pk_is_deterministic_per_id() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let h = host(&store, &oracle, BTreeMap::new());
        let a = h.derive_pk(b"account/0");
        let b = h.derive_pk(b"account/0");
        let c = h.derive_pk(b"account/1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
    }

    #[test]
    fn derive_pk_depends_on_the_seed() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let a = ManagerHost::new(
            &store,
            &oracle,
            ContractId::zero(),
            BTreeMap::new(),
            [1u8; 32],
        )
        .derive_pk(b"id");
        let b = ManagerHost::new(
            &store,
            &oracle,
            ContractId::zero(),
            BTreeMap::new(),
            [2u8; 32],
        )
        .derive_pk(b"id");
        assert_ne!(a, b);
    }
}
