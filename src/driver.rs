//! The execution driver: top-level contract invocations.
//!
//! One invocation builds a fresh process (operand stack, linear memory,
//! charge meter), pushes a far-call frame for the entry contract and steps
//! the interpreter until the frame stack unwinds. Side effects stay staged
//! in the host; they are applied to the store only when the run completes
//! and the accumulated signer keys verify. Any fault discards everything.

use crate::compiler::{self, errors::CompileError, image::FuncType};
use crate::crypto::secp::PubKey;
use crate::crypto::signature::{verify_signers, SigBundle};
use crate::host::bindings::Kind;
use crate::host::contract::ContractHost;
use crate::host::funds::FundsCommitment;
use crate::host::oracle::ChainOracle;
use crate::info;
use crate::storage::store::VariableStore;
use crate::types::ids::ContractId;
use crate::vm::errors::Fault;
use crate::vm::ops::value_type;
use crate::vm::processor::Processor;

/// Method number of the constructor.
pub const METHOD_CTOR: u32 = 0;

/// Method number of the destructor.
pub const METHOD_DTOR: u32 = 1;

/// A typed argument for a top-level method invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgValue {
    I32(u32),
    I64(u64),
}

impl ArgValue {
    fn type_tag(&self) -> u8 {
        match self {
            ArgValue::I32(_) => value_type::I32,
            ArgValue::I64(_) => value_type::I64,
        }
    }
}

/// Why the entry invocation could not even start.
#[derive(Debug, PartialEq, Eq)]
pub enum MalformedKind {
    /// No registry entry for the contract.
    MissingContract,
    /// The entry contract failed to compile.
    Compile(CompileError),
    /// The contract does not export the requested method.
    NoSuchMethod(u32),
    /// Supplied arguments do not match the method signature.
    ArgMismatch,
}

/// Everything a successful invocation hands back to the transaction engine.
pub struct Receipt {
    /// The method's return value, if its signature declares one.
    pub ret: Option<u64>,
    /// Commitment over the funds accumulator.
    pub funds_commitment: FundsCommitment,
    /// Keys that co-signed the transaction (already verified).
    pub signatures_required: Vec<PubKey>,
    /// Variable writes, applied to the store by the time the receipt is
    /// returned.
    pub var_writes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

/// Terminal state of one invocation.
pub enum Outcome {
    Ok(Receipt),
    Faulted(Fault),
    OutOfCharge,
    SignatureRejected,
    Malformed(MalformedKind),
}

/// Outcome plus the charge consumed (meaningful for every outcome).
pub struct InvokeResult {
    pub outcome: Outcome,
    pub charge: u64,
}

/// Driver over a variable store and a chain oracle.
pub struct Engine<'a, S: VariableStore> {
    store: &'a mut S,
    oracle: &'a dyn ChainOracle,
}

impl<'a, S: VariableStore> Engine<'a, S> {
    pub fn new(store: &'a mut S, oracle: &'a dyn ChainOracle) -> Self {
        Self { store, oracle }
    }

    /// Invokes `Method_<method>` of a deployed contract.
    ///
    /// `sig` carries the transaction message and signatures checked against
    /// the keys the contract accumulates via `AddSig`; pass `None` for a
    /// transaction without signatures (rejected if the contract requires
    /// any).
    pub fn invoke(
        &mut self,
        cid: &ContractId,
        method: u32,
        args: &[ArgValue],
        charge_ceiling: u64,
        sig: Option<&SigBundle>,
    ) -> InvokeResult {
        self.run(cid, method, EntryArgs::Typed(args), charge_ceiling, sig, None, false)
    }

    /// Invokes a method with a raw argument blob.
    ///
    /// The blob is copied into the fresh process's linear memory and its
    /// address passed as the method's single `i32` argument, the same
    /// convention `CallFar` uses between contracts.
    pub fn invoke_blob(
        &mut self,
        cid: &ContractId,
        method: u32,
        args: &[u8],
        charge_ceiling: u64,
        sig: Option<&SigBundle>,
    ) -> InvokeResult {
        self.run(cid, method, EntryArgs::Blob(args), charge_ceiling, sig, None, false)
    }

    /// Deploys a contract: stages its body in the registry, then runs its
    /// constructor. Returns the new contract id alongside the result.
    pub fn deploy(
        &mut self,
        body: &[u8],
        ctor_args: &[ArgValue],
        charge_ceiling: u64,
        sig: Option<&SigBundle>,
    ) -> (ContractId, InvokeResult) {
        let mut arg_blob = Vec::new();
        for arg in ctor_args {
            match arg {
                ArgValue::I32(v) => arg_blob.extend_from_slice(&v.to_le_bytes()),
                ArgValue::I64(v) => arg_blob.extend_from_slice(&v.to_le_bytes()),
            }
        }
        let cid = ContractId::derive(body, &arg_blob);
        let result = self.run(
            &cid,
            METHOD_CTOR,
            EntryArgs::Typed(ctor_args),
            charge_ceiling,
            sig,
            Some(body),
            false,
        );
        (cid, result)
    }

    /// Destroys a contract: runs its destructor, then removes the body from
    /// the registry. Refused while other contracts hold references.
    pub fn destroy(
        &mut self,
        cid: &ContractId,
        args: &[ArgValue],
        charge_ceiling: u64,
        sig: Option<&SigBundle>,
    ) -> InvokeResult {
        self.run(cid, METHOD_DTOR, EntryArgs::Typed(args), charge_ceiling, sig, None, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        cid: &ContractId,
        method: u32,
        args: EntryArgs<'_>,
        charge_ceiling: u64,
        sig: Option<&SigBundle>,
        deploy_body: Option<&[u8]>,
        destroy: bool,
    ) -> InvokeResult {
        let mut host = ContractHost::new(&*self.store, self.oracle);
        if let Some(body) = deploy_body {
            host.stage_contract(cid, body);
        }

        let Some(body) = host.contract_body(cid) else {
            return InvokeResult {
                outcome: Outcome::Malformed(MalformedKind::MissingContract),
                charge: 0,
            };
        };
        let image = match compiler::compile(&body, Kind::Contract) {
            Ok(image) => image,
            Err(e) => {
                return InvokeResult {
                    outcome: Outcome::Malformed(MalformedKind::Compile(e)),
                    charge: 0,
                };
            }
        };
        let Some(ty) = image.method_type(method) else {
            return InvokeResult {
                outcome: Outcome::Malformed(MalformedKind::NoSuchMethod(method)),
                charge: 0,
            };
        };
        if !args.matches(ty) {
            return InvokeResult {
                outcome: Outcome::Malformed(MalformedKind::ArgMismatch),
                charge: 0,
            };
        }
        let ret_words = ty.ret_words();

        let mut proc = Processor::new(charge_ceiling);
        let entered = args
            .push(&mut proc)
            .and_then(|_| proc.enter_frame(*cid, image, method, None));
        if let Err(fault) = entered {
            return InvokeResult {
                charge: proc.charge().spent(),
                outcome: fault_outcome(fault),
            };
        }

        while !proc.is_done() {
            if let Err(fault) = proc.step(&mut host) {
                info!("invocation of {} method {} faulted: {}", cid, method, fault);
                return InvokeResult {
                    charge: proc.charge().spent(),
                    outcome: fault_outcome(fault),
                };
            }
        }

        let ret = match read_ret(&mut proc, ret_words) {
            Ok(ret) => ret,
            Err(fault) => {
                return InvokeResult {
                    charge: proc.charge().spent(),
                    outcome: fault_outcome(fault),
                };
            }
        };

        if destroy {
            if let Err(fault) = host.remove_contract(cid) {
                return InvokeResult {
                    charge: proc.charge().spent(),
                    outcome: fault_outcome(fault),
                };
            }
        }

        // Post-run signature verification over the accumulated keys.
        let empty = SigBundle::default();
        let bundle = sig.unwrap_or(&empty);
        if !host.signers().is_empty()
            && !verify_signers(&bundle.message, host.signers(), &bundle.signatures)
        {
            return InvokeResult {
                charge: proc.charge().spent(),
                outcome: Outcome::SignatureRejected,
            };
        }

        let (writes, funds_commitment, signers) = host.into_effects();
        for (key, value) in &writes {
            self.store.save(key, value.as_deref());
        }
        info!(
            "invocation of {} method {} done, charge {}",
            cid,
            method,
            proc.charge().spent()
        );

        InvokeResult {
            charge: proc.charge().spent(),
            outcome: Outcome::Ok(Receipt {
                ret,
                funds_commitment,
                signatures_required: signers,
                var_writes: writes,
            }),
        }
    }
}

/// How the entry method receives its arguments.
enum EntryArgs<'a> {
    /// Typed values pushed straight onto the operand stack.
    Typed(&'a [ArgValue]),
    /// A raw blob copied into linear memory, address passed as one `i32`.
    Blob(&'a [u8]),
}

impl EntryArgs<'_> {
    fn matches(&self, ty: &FuncType) -> bool {
        match self {
            EntryArgs::Typed(args) => {
                ty.args.len() == args.len()
                    && ty
                        .args
                        .iter()
                        .zip(*args)
                        .all(|(&tag, arg)| tag == arg.type_tag())
            }
            EntryArgs::Blob(_) => ty.args == [value_type::I32],
        }
    }

    fn push(&self, proc: &mut Processor) -> Result<(), Fault> {
        match self {
            EntryArgs::Typed(args) => {
                for arg in *args {
                    match arg {
                        ArgValue::I32(v) => proc.push_word(*v)?,
                        ArgValue::I64(v) => proc.push_u64(*v)?,
                    }
                }
                Ok(())
            }
            EntryArgs::Blob(blob) => {
                let ptr = proc.memory_mut().stack_alloc(blob.len() as u32)?;
                proc.memory_mut().write(ptr, blob)?;
                proc.push_word(ptr)
            }
        }
    }
}

/// Pops the declared return value once the frame stack has unwound.
fn read_ret(proc: &mut Processor, ret_words: u32) -> Result<Option<u64>, Fault> {
    match ret_words {
        0 => Ok(None),
        1 => Ok(Some(u64::from(proc.pop_word()?))),
        2 => Ok(Some(proc.pop_u64()?)),
        _ => Err(Fault::StackBounds),
    }
}

fn fault_outcome(fault: Fault) -> Outcome {
    match fault {
        Fault::OutOfCharge => Outcome::OutOfCharge,
        other => Outcome::Faulted(other),
    }
}
