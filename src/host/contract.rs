//! Contract-mode host: the binding table on-chain contracts execute under.
//!
//! All mutating effects (variable writes, funds movements, accumulated
//! signer keys) are staged inside the host and surface only through
//! [`into_effects`](ContractHost::into_effects); a faulted invocation drops
//! the host and with it every staged effect.

use crate::compiler;
use crate::crypto::secp::{PubKey, PUBKEY_LEN};
use crate::host::bindings::{self, ids, Kind};
use crate::host::common::{self, read_struct, CommonState};
use crate::host::funds::{FundsAccumulator, FundsCommitment};
use crate::host::oracle::ChainOracle;
use crate::storage::store::{OverlayStore, VariableStore};
use crate::storage::var_key::{Tag, VarKey};
use crate::types::encoding::{Decode, Encode};
use crate::types::ids::{AssetId, ContractId};
use crate::vm::charge::ChargeCategory;
use crate::vm::errors::Fault;
use crate::vm::processor::{HostAbi, Processor};
use crate::vm::Limits;
use crate::warn;
use contract_vm_derive::BinaryCodec;

/// Key (under the system namespace) of the next-asset-id counter.
const ASSET_SEQ_KEY: &[u8] = b"asset.seq";

/// Registry record of a created asset, stored under the system namespace.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
struct AssetRecord {
    owner: ContractId,
    supply: u64,
    meta: Vec<u8>,
}

/// The contract-mode host environment for one invocation.
pub struct ContractHost<'a> {
    store: OverlayStore<'a>,
    oracle: &'a dyn ChainOracle,
    common: CommonState,
    funds: FundsAccumulator,
    sigs: Vec<PubKey>,
}

impl<'a> ContractHost<'a> {
    pub fn new(base: &'a dyn VariableStore, oracle: &'a dyn ChainOracle) -> Self {
        Self {
            store: OverlayStore::new(base),
            oracle,
            common: CommonState::new(),
            funds: FundsAccumulator::new(),
            sigs: Vec::new(),
        }
    }

    /// Public keys accumulated through `AddSig` so far.
    pub fn signers(&self) -> &[PubKey] {
        &self.sigs
    }

    /// Consumes the host, returning the staged variable writes, the funds
    /// commitment and the required signer list.
    pub fn into_effects(
        self,
    ) -> (
        Vec<(Vec<u8>, Option<Vec<u8>>)>,
        FundsCommitment,
        Vec<PubKey>,
    ) {
        let commitment = self.funds.commitment();
        (self.store.into_writes(), commitment, self.sigs)
    }

    /// Whether a contract body is present in the registry.
    pub fn contract_exists(&self, cid: &ContractId) -> bool {
        self.contract_body(cid).is_some()
    }

    /// The registry body of a contract, if deployed.
    pub fn contract_body(&self, cid: &ContractId) -> Option<Vec<u8>> {
        self.store.load(VarKey::registry(cid).as_slice())
    }

    /// Stages a contract body into the registry (deployment).
    pub fn stage_contract(&mut self, cid: &ContractId, body: &[u8]) {
        self.store.save(VarKey::registry(cid).as_slice(), Some(body));
    }

    /// Stages removal of a contract body (destruction). Refused while other
    /// contracts hold references to it.
    pub fn remove_contract(&mut self, cid: &ContractId) -> Result<(), Fault> {
        if self.refs_of(cid)? != 0 {
            return Err(Fault::ContractReferenced);
        }
        self.store.save(VarKey::registry(cid).as_slice(), None);
        Ok(())
    }

    /// Current reference count held against a contract.
    pub fn refs_of(&self, cid: &ContractId) -> Result<u64, Fault> {
        let vk = VarKey::tagged(cid, Tag::Refs, b"").ok_or(Fault::VarKeyTooLong)?;
        Ok(self.load_u64_or_zero(&vk))
    }

    fn load_u64_or_zero(&self, vk: &VarKey) -> u64 {
        self.store
            .load(vk.as_slice())
            .and_then(|v| u64::from_bytes(&v).ok())
            .unwrap_or(0)
    }

    /// Saves a counter, deleting the key when it reaches zero.
    fn save_u64_nnz(&mut self, vk: &VarKey, value: u64) {
        if value == 0 {
            self.store.save(vk.as_slice(), None);
        } else {
            self.store.save(vk.as_slice(), Some(&value.to_bytes()));
        }
    }

    fn cur_cid(proc: &Processor) -> Result<ContractId, Fault> {
        proc.current_cid().ok_or(Fault::ContractMissing)
    }

    fn read_cid(proc: &Processor, ptr: u32) -> Result<ContractId, Fault> {
        Ok(ContractId(proc.memory().read_array::<32>(ptr)?))
    }

    fn asset_key(aid: AssetId) -> Result<VarKey, Fault> {
        VarKey::tagged(&ContractId::zero(), Tag::OwnedAsset, &aid.to_le_bytes())
            .ok_or(Fault::VarKeyTooLong)
    }

    fn load_asset(&self, aid: AssetId) -> Result<AssetRecord, Fault> {
        let vk = Self::asset_key(aid)?;
        self.store
            .load(vk.as_slice())
            .and_then(|v| AssetRecord::from_bytes(&v).ok())
            .ok_or(Fault::AssetNotOwned(aid))
    }

    fn save_asset(&mut self, aid: AssetId, record: &AssetRecord) -> Result<(), Fault> {
        let vk = Self::asset_key(aid)?;
        self.store.save(vk.as_slice(), Some(&record.to_bytes()));
        Ok(())
    }

    /// Builds a tagged key in the executing contract's namespace from a
    /// `(ptr, len, tag)` triple supplied by the contract.
    fn user_key(
        &self,
        proc: &Processor,
        p_key: u32,
        n_key: u32,
        n_type: u32,
    ) -> Result<VarKey, Fault> {
        let tag = Tag::from_u8(n_type as u8).ok_or(Fault::BadVarTag(n_type as u8))?;
        if n_key > Limits::VAR_KEY_SIZE {
            return Err(Fault::VarKeyTooLong);
        }
        let cid = Self::cur_cid(proc)?;
        let key = proc.memory().read(p_key, n_key)?;
        VarKey::tagged(&cid, tag, key).ok_or(Fault::VarKeyTooLong)
    }

    fn load_var(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_type = proc.pop_word()?;
        let n_val = proc.pop_word()?;
        let p_val = proc.pop_word()?;
        let n_key = proc.pop_word()?;
        let p_key = proc.pop_word()?;

        let vk = self.user_key(proc, p_key, n_key, n_type)?;
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

    fn save_var(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_type = proc.pop_word()?;
        let n_val = proc.pop_word()?;
        let p_val = proc.pop_word()?;
        let n_key = proc.pop_word()?;
        let p_key = proc.pop_word()?;

        if n_val > Limits::VAR_SIZE {
            return Err(Fault::VarTooLong);
        }
        let vk = self.user_key(proc, p_key, n_key, n_type)?;
        proc.charge_mut()
            .pay(ChargeCategory::StateWrite, u64::from(n_key + n_val) / 8)?;

        // A zero-length save is a deletion.
        let was_new = if n_val == 0 {
            self.store.save(vk.as_slice(), None)
        } else {
            let value = proc.memory().read(p_val, n_val)?.to_vec();
            self.store.save(vk.as_slice(), Some(&value))
        };
        proc.push_word(was_new as u32)?;
        Ok(())
    }

    fn call_far(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_args = proc.pop_word()?;
        let p_args = proc.pop_word()?;
        let method = proc.pop_word()?;
        let cid_ptr = proc.pop_word()?;

        let cid = Self::read_cid(proc, cid_ptr)?;
        // The callee receives a pointer into shared linear memory; make
        // sure the advertised argument range is addressable up front.
        proc.memory().read(p_args, n_args)?;

        let body = self
            .store
            .load(VarKey::registry(&cid).as_slice())
            .ok_or(Fault::ContractMissing)?;
        proc.charge_mut()
            .pay(ChargeCategory::FarCall, body.len() as u64 / 16)?;
        let image = compiler::compile(&body, Kind::Contract).map_err(Fault::NestedCompile)?;

        proc.enter_frame(cid, image, method, Some(p_args))
    }

    fn funds_move(&mut self, proc: &mut Processor, lock: bool) -> Result<(), Fault> {
        let amount = proc.pop_u64()?;
        let aid = proc.pop_word()?;

        let cid = Self::cur_cid(proc)?;
        let vk = VarKey::tagged(&cid, Tag::LockedAmount, &aid.to_le_bytes())
            .ok_or(Fault::VarKeyTooLong)?;
        let held = self.load_u64_or_zero(&vk);
        let next = if lock {
            self.funds.lock(aid, amount);
            held.checked_add(amount).ok_or(Fault::FundsOverflow)?
        } else {
            self.funds.unlock(aid, amount);
            held.checked_sub(amount).ok_or(Fault::FundsUnderflow)?
        };
        self.save_u64_nnz(&vk, next);
        Ok(())
    }

    fn ref_adjust(&mut self, proc: &mut Processor, add: bool) -> Result<(), Fault> {
        let cid_ptr = proc.pop_word()?;
        let target = Self::read_cid(proc, cid_ptr)?;

        let vk = VarKey::tagged(&target, Tag::Refs, b"").ok_or(Fault::VarKeyTooLong)?;
        let refs = self.load_u64_or_zero(&vk);
        // Failure is a 0 flag, not a fault: only a live contract can be
        // referenced, and the counter must not wrap in either direction.
        let next = if add {
            if !self.contract_exists(&target) {
                return proc.push_word(0);
            }
            match refs.checked_add(1) {
                Some(next) => next,
                None => return proc.push_word(0),
            }
        } else {
            match refs.checked_sub(1) {
                Some(next) => next,
                None => return proc.push_word(0),
            }
        };
        self.save_u64_nnz(&vk, next);
        proc.push_word(1)
    }

    fn asset_create(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let n_meta = proc.pop_word()?;
        let p_meta = proc.pop_word()?;
        let meta = proc.memory().read(p_meta, n_meta)?.to_vec();

        let seq_key = VarKey::tagged(&ContractId::zero(), Tag::Internal, ASSET_SEQ_KEY)
            .ok_or(Fault::VarKeyTooLong)?;
        let aid = self.load_u64_or_zero(&seq_key) as AssetId + 1;
        self.save_u64_nnz(&seq_key, u64::from(aid));

        let owner = Self::cur_cid(proc)?;
        self.save_asset(
            aid,
            &AssetRecord {
                owner,
                supply: 0,
                meta,
            },
        )?;
        // Ownership marker inside the owner's namespace.
        let own_key = VarKey::tagged(&owner, Tag::OwnedAsset, &aid.to_le_bytes())
            .ok_or(Fault::VarKeyTooLong)?;
        self.store.save(own_key.as_slice(), Some(&[1]));

        proc.push_word(aid)
    }

    fn asset_emit(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let emit = proc.pop_word()?;
        let amount = proc.pop_u64()?;
        let aid = proc.pop_word()?;

        let mut record = self.load_asset(aid)?;
        if record.owner != Self::cur_cid(proc)? {
            return Err(Fault::AssetNotOwned(aid));
        }

        if emit != 0 {
            record.supply = record
                .supply
                .checked_add(amount)
                .ok_or(Fault::FundsOverflow)?;
        } else {
            // Burning more than the outstanding supply is refused, not a
            // fault: the contract sees the failure and decides.
            let Some(next) = record.supply.checked_sub(amount) else {
                proc.push_word(0)?;
                return Ok(());
            };
            record.supply = next;
        }
        self.save_asset(aid, &record)?;
        proc.push_word(1)
    }

    fn asset_destroy(&mut self, proc: &mut Processor) -> Result<(), Fault> {
        let aid = proc.pop_word()?;

        let record = self.load_asset(aid)?;
        let owner = Self::cur_cid(proc)?;
        if record.owner != owner {
            return Err(Fault::AssetNotOwned(aid));
        }
        if record.supply != 0 {
            warn!("asset {} destroy refused: supply outstanding", aid);
            proc.push_word(0)?;
            return Ok(());
        }

        let vk = Self::asset_key(aid)?;
        self.store.save(vk.as_slice(), None);
        let own_key = VarKey::tagged(&owner, Tag::OwnedAsset, &aid.to_le_bytes())
            .ok_or(Fault::VarKeyTooLong)?;
        self.store.save(own_key.as_slice(), None);
        proc.push_word(1)
    }
}

impl HostAbi for ContractHost<'_> {
    fn invoke_ext(&mut self, proc: &mut Processor, binding: u32) -> Result<(), Fault> {
        let charge = bindings::charge_of(Kind::Contract, binding)
            .ok_or(Fault::UnknownBinding(binding))?;
        proc.charge_mut().pay(ChargeCategory::HostCall, charge)?;

        if common::dispatch(proc, &mut self.common, self.oracle, binding)? {
            return Ok(());
        }

        match binding {
            ids::LOAD_VAR => self.load_var(proc),
            ids::SAVE_VAR => self.save_var(proc),
            ids::CALL_FAR => self.call_far(proc),
            ids::GET_CALL_DEPTH => {
                let depth = proc.call_depth();
                proc.push_word(depth)
            }
            ids::GET_CALLER_CID => {
                let cid_ptr = proc.pop_word()?;
                let depth_back = proc.pop_word()?;
                let caller = proc.caller_cid(depth_back).ok_or(Fault::CallDepth)?;
                proc.memory_mut().write(cid_ptr, caller.as_slice())
            }
            ids::ADD_SIG => {
                let pk_ptr = proc.pop_word()?;
                let pk: PubKey = read_struct(proc, pk_ptr, PUBKEY_LEN as u32)?;
                self.sigs.push(pk);
                Ok(())
            }
            ids::FUNDS_LOCK => self.funds_move(proc, true),
            ids::FUNDS_UNLOCK => self.funds_move(proc, false),
            ids::REF_ADD => self.ref_adjust(proc, true),
            ids::REF_RELEASE => self.ref_adjust(proc, false),
            ids::ASSET_CREATE => self.asset_create(proc),
            ids::ASSET_EMIT => self.asset_emit(proc),
            ids::ASSET_DESTROY => self.asset_destroy(proc),
            _ => Err(Fault::UnknownBinding(binding)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::MemoryStore;
    use crate::host::oracle::StaticOracle;

    fn cid(b: u8) -> ContractId {
        ContractId([b; 32])
    }

    #[test]
    fn staged_contract_is_visible_before_commit() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let mut host = ContractHost::new(&store, &oracle);
        assert!(!host.contract_exists(&cid(1)));
        host.stage_contract(&cid(1), b"body");
        assert!(host.contract_exists(&cid(1)));
    }

    #[test]
    fn remove_contract_refused_while_referenced() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let mut host = ContractHost::new(&store, &oracle);
        host.stage_contract(&cid(1), b"body");

        let vk = VarKey::tagged(&cid(1), Tag::Refs, b"").unwrap();
        host.save_u64_nnz(&vk, 2);
        assert_eq!(host.remove_contract(&cid(1)), Err(Fault::ContractReferenced));

        host.save_u64_nnz(&vk, 0);
        assert!(host.remove_contract(&cid(1)).is_ok());
    }

    #[test]
    fn effects_capture_funds_and_signers() {
        let store = MemoryStore::new();
        let oracle = StaticOracle::at_height(1);
        let mut host = ContractHost::new(&store, &oracle);
        host.funds.lock(0, 5);
        host.sigs.push(PubKey::default());

        let (writes, commitment, sigs) = host.into_effects();
        assert!(writes.is_empty());
        assert!(!commitment.is_neutral());
        assert_eq!(sigs.len(), 1);
    }
}
