//! Bindings shared by both execution modes: memory utilities, allocators,
//! hash contexts, curve arithmetic and the chain oracle.

use crate::crypto::hashes::HashContext;
use crate::crypto::secp::{self, PubKey};
use crate::host::bindings::ids;
use crate::host::oracle::ChainOracle;
use crate::types::encoding::{Decode, Encode};
use crate::vm::charge::ChargeCategory;
use crate::vm::errors::Fault;
use crate::vm::processor::Processor;
use k256::{ProjectivePoint, Scalar};

/// Live host objects addressed by small integer handles. Handle 0 is never
/// valid, so contracts can use it as a null value.
pub(crate) struct HandleTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn insert(&mut self, value: T) -> u32 {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(value);
                return (i + 1) as u32;
            }
        }
        self.slots.push(Some(value));
        self.slots.len() as u32
    }

    pub(crate) fn get(&self, handle: u32) -> Result<&T, Fault> {
        handle
            .checked_sub(1)
            .and_then(|i| self.slots.get(i as usize))
            .and_then(|s| s.as_ref())
            .ok_or(Fault::BadHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: u32) -> Result<&mut T, Fault> {
        handle
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i as usize))
            .and_then(|s| s.as_mut())
            .ok_or(Fault::BadHandle(handle))
    }

    pub(crate) fn remove(&mut self, handle: u32) -> Result<T, Fault> {
        handle
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i as usize))
            .and_then(|s| s.take())
            .ok_or(Fault::BadHandle(handle))
    }
}

/// Host objects common to both modes.
pub(crate) struct CommonState {
    pub hashes: HandleTable<HashContext>,
    pub scalars: HandleTable<Scalar>,
    pub points: HandleTable<ProjectivePoint>,
}

impl CommonState {
    pub(crate) fn new() -> Self {
        Self {
            hashes: HandleTable::new(),
            scalars: HandleTable::new(),
            points: HandleTable::new(),
        }
    }
}

/// Reads a codec struct out of VM memory.
pub(crate) fn read_struct<T: Decode>(proc: &Processor, addr: u32, len: u32) -> Result<T, Fault> {
    let bytes = proc.memory().read(addr, len)?;
    T::from_bytes(bytes).map_err(|_| Fault::MemoryBounds { addr, len })
}

/// Writes a codec struct into VM memory.
pub(crate) fn write_struct<T: Encode>(proc: &mut Processor, addr: u32, value: &T) -> Result<(), Fault> {
    let bytes = value.to_bytes();
    proc.memory_mut().write(addr, &bytes)
}

/// Dispatches one of the shared bindings. Returns `false` when the id
/// belongs to a mode-specific table, leaving it to the caller.
pub(crate) fn dispatch(
    proc: &mut Processor,
    state: &mut CommonState,
    oracle: &dyn ChainOracle,
    binding: u32,
) -> Result<bool, Fault> {
    match binding {
        ids::MEMCPY => {
            let n = proc.pop_word()?;
            let src = proc.pop_word()?;
            let dst = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            let data = proc.memory().read(src, n)?.to_vec();
            proc.memory_mut().write(dst, &data)?;
            proc.push_word(dst)?;
        }
        ids::MEMSET => {
            let n = proc.pop_word()?;
            let value = proc.pop_word()?;
            let dst = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            proc.memory_mut().read_mut(dst, n)?.fill(value as u8);
            proc.push_word(dst)?;
        }
        ids::MEMCMP => {
            let n = proc.pop_word()?;
            let b = proc.pop_word()?;
            let a = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            let ord = {
                let pa = proc.memory().read(a, n)?;
                let pb = proc.memory().read(b, n)?;
                pa.cmp(pb)
            };
            proc.push_word(ord as i32 as u32)?;
        }
        ids::MEMIS0 => {
            let n = proc.pop_word()?;
            let p = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            let zero = proc.memory().read(p, n)?.iter().all(|&b| b == 0);
            proc.push_word(zero as u32)?;
        }
        ids::STRLEN => {
            let p = proc.pop_word()?;
            let len = proc.memory().strlen(p)?;
            proc.push_word(len)?;
        }
        ids::STRCMP => {
            let b = proc.pop_word()?;
            let a = proc.pop_word()?;
            let ord = {
                let sa = proc.memory().read_str(a)?;
                let sb = proc.memory().read_str(b)?;
                sa.cmp(sb)
            };
            proc.push_word(ord as i32 as u32)?;
        }
        ids::STACK_ALLOC => {
            let n = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            let addr = proc.memory_mut().stack_alloc(n)?;
            proc.push_word(addr)?;
        }
        ids::STACK_FREE => {
            let n = proc.pop_word()?;
            proc.memory_mut().stack_free(n)?;
        }
        ids::HEAP_ALLOC => {
            let n = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Memory, u64::from(n / 16))?;
            let addr = proc.memory_mut().heap_alloc(n);
            proc.push_word(addr)?;
        }
        ids::HEAP_FREE => {
            let p = proc.pop_word()?;
            proc.memory_mut().heap_free(p)?;
        }
        ids::HALT => {
            return Err(Fault::Halted);
        }
        ids::HASH_CREATE_SHA256 => {
            let handle = state.hashes.insert(HashContext::sha256());
            proc.push_word(handle)?;
        }
        ids::HASH_CREATE_KECCAK256 => {
            let handle = state.hashes.insert(HashContext::keccak256());
            proc.push_word(handle)?;
        }
        ids::HASH_CREATE_BLAKE2B => {
            let digest_len = proc.pop_word()?;
            let n_personal = proc.pop_word()?;
            let p_personal = proc.pop_word()?;
            let personal = proc.memory().read(p_personal, n_personal)?.to_vec();
            let ctx = HashContext::blake2b(&personal, digest_len as usize)
                .ok_or(Fault::BadHashParams)?;
            let handle = state.hashes.insert(ctx);
            proc.push_word(handle)?;
        }
        ids::HASH_WRITE => {
            let n = proc.pop_word()?;
            let p = proc.pop_word()?;
            let handle = proc.pop_word()?;
            proc.charge_mut().pay(ChargeCategory::Crypto, u64::from(n / 16))?;
            let data = proc.memory().read(p, n)?.to_vec();
            state.hashes.get_mut(handle)?.write(&data);
        }
        ids::HASH_GET_VALUE => {
            let n = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let handle = proc.pop_word()?;
            let ctx = state.hashes.get(handle)?;
            let mut digest = vec![0u8; (n as usize).min(ctx.digest_len())];
            ctx.digest_into(&mut digest);
            proc.memory_mut().write(dst, &digest)?;
        }
        ids::HASH_FREE => {
            let handle = proc.pop_word()?;
            state.hashes.remove(handle)?;
        }
        ids::GET_HEIGHT => {
            proc.push_u64(oracle.height())?;
        }
        ids::GET_HDR_INFO => {
            let ptr = proc.pop_word()?;
            let height = u64::from_le_bytes(proc.memory().read_array::<8>(ptr)?);
            let header = oracle
                .header_at(height)
                .ok_or(Fault::HeaderMissing(height))?;
            write_struct(proc, ptr, &header.info())?;
        }
        ids::GET_HDR_FULL => {
            let ptr = proc.pop_word()?;
            let height = u64::from_le_bytes(proc.memory().read_array::<8>(ptr)?);
            let header = oracle
                .header_at(height)
                .ok_or(Fault::HeaderMissing(height))?;
            write_struct(proc, ptr, &header)?;
        }
        ids::GET_RULES_CFG => {
            let res_ptr = proc.pop_word()?;
            let height = proc.pop_u64()?;
            let (hash, activation) = oracle.rules_cfg(height);
            proc.memory_mut().write(res_ptr, &hash)?;
            proc.push_u64(activation)?;
        }
        ids::SECP_SCALAR_ALLOC => {
            let handle = state.scalars.insert(Scalar::ZERO);
            proc.push_word(handle)?;
        }
        ids::SECP_SCALAR_FREE => {
            let handle = proc.pop_word()?;
            state.scalars.remove(handle)?;
        }
        ids::SECP_SCALAR_IMPORT => {
            let data = proc.pop_word()?;
            let handle = proc.pop_word()?;
            let bytes = proc.memory().read_array::<32>(data)?;
            let slot = state.scalars.get_mut(handle)?;
            match secp::scalar_from_bytes(&bytes) {
                Some(s) => {
                    *slot = s;
                    proc.push_word(1)?;
                }
                None => {
                    *slot = Scalar::ZERO;
                    proc.push_word(0)?;
                }
            }
        }
        ids::SECP_SCALAR_EXPORT => {
            let data = proc.pop_word()?;
            let handle = proc.pop_word()?;
            let bytes = secp::scalar_to_bytes(state.scalars.get(handle)?);
            proc.memory_mut().write(data, &bytes)?;
        }
        ids::SECP_SCALAR_NEG => {
            let src = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = -*state.scalars.get(src)?;
            *state.scalars.get_mut(dst)? = value;
        }
        ids::SECP_SCALAR_ADD => {
            let b = proc.pop_word()?;
            let a = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = *state.scalars.get(a)? + *state.scalars.get(b)?;
            *state.scalars.get_mut(dst)? = value;
        }
        ids::SECP_SCALAR_MUL => {
            let b = proc.pop_word()?;
            let a = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = *state.scalars.get(a)? * *state.scalars.get(b)?;
            *state.scalars.get_mut(dst)? = value;
        }
        ids::SECP_SCALAR_INV => {
            let src = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = Option::<Scalar>::from(state.scalars.get(src)?.invert())
                .ok_or(Fault::NotInvertible)?;
            *state.scalars.get_mut(dst)? = value;
        }
        ids::SECP_SCALAR_SET => {
            let value = proc.pop_u64()?;
            let handle = proc.pop_word()?;
            *state.scalars.get_mut(handle)? = Scalar::from(value);
        }
        ids::SECP_POINT_ALLOC => {
            let handle = state.points.insert(ProjectivePoint::IDENTITY);
            proc.push_word(handle)?;
        }
        ids::SECP_POINT_FREE => {
            let handle = proc.pop_word()?;
            state.points.remove(handle)?;
        }
        ids::SECP_POINT_IMPORT => {
            let pk_ptr = proc.pop_word()?;
            let handle = proc.pop_word()?;
            let pk: PubKey = read_struct(proc, pk_ptr, secp::PUBKEY_LEN as u32)?;
            let slot = state.points.get_mut(handle)?;
            match secp::point_from_pubkey(&pk) {
                Some(p) => {
                    *slot = p;
                    proc.push_word(1)?;
                }
                None => {
                    *slot = ProjectivePoint::IDENTITY;
                    proc.push_word(0)?;
                }
            }
        }
        ids::SECP_POINT_EXPORT => {
            let pk_ptr = proc.pop_word()?;
            let handle = proc.pop_word()?;
            let pk = secp::pubkey_from_point(state.points.get(handle)?);
            write_struct(proc, pk_ptr, &pk)?;
        }
        ids::SECP_POINT_NEG => {
            let src = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = -*state.points.get(src)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::SECP_POINT_ADD => {
            let b = proc.pop_word()?;
            let a = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = *state.points.get(a)? + *state.points.get(b)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::SECP_POINT_MUL => {
            let scalar = proc.pop_word()?;
            let point = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = *state.points.get(point)? * *state.scalars.get(scalar)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::SECP_POINT_IS_ZERO => {
            let handle = proc.pop_word()?;
            let zero = *state.points.get(handle)? == ProjectivePoint::IDENTITY;
            proc.push_word(zero as u32)?;
        }
        ids::SECP_POINT_MUL_G => {
            let scalar = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = secp::generator() * *state.scalars.get(scalar)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::SECP_POINT_MUL_J => {
            let scalar = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = secp::generator_j() * *state.scalars.get(scalar)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::SECP_POINT_MUL_H => {
            let aid = proc.pop_word()?;
            let scalar = proc.pop_word()?;
            let dst = proc.pop_word()?;
            let value = secp::asset_generator(aid) * *state.scalars.get(scalar)?;
            *state.points.get_mut(dst)? = value;
        }
        ids::VERIFY_BEAM_HASH_III => {
            let n_sol = proc.pop_word()?;
            let p_sol = proc.pop_word()?;
            let n_nonce = proc.pop_word()?;
            let p_nonce = proc.pop_word()?;
            let n_inp = proc.pop_word()?;
            let p_inp = proc.pop_word()?;
            let valid = {
                let input = proc.memory().read(p_inp, n_inp)?;
                let nonce = proc.memory().read(p_nonce, n_nonce)?;
                let solution = proc.memory().read(p_sol, n_sol)?;
                oracle.verify_pow(input, nonce, solution)
            };
            proc.push_word(valid as u32)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}
