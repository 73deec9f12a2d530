//! Runtime fault taxonomy.

use crate::compiler::errors::CompileError;
use contract_vm_derive::Error;

/// A runtime violation. Any fault collapses the whole invocation: nothing is
/// recovered inside the interpreter and every staged side effect is
/// discarded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Fault {
    /// Opcode byte with no executable-form instruction.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    /// Instruction pointer or immediate read outside the code stream.
    #[error("code access out of bounds at pc {0}")]
    CodeBounds(u32),
    /// Operand stack under- or overflow.
    #[error("operand stack bounds violated")]
    StackBounds,
    /// Packed local reference outside the live frame.
    #[error("local variable offset out of range")]
    LocalBounds,
    /// Linear memory access outside the provisioned region.
    #[error("linear memory access out of bounds: address {addr}, length {len}")]
    MemoryBounds { addr: u32, len: u32 },
    /// Alloca region exhausted or released past its base.
    #[error("memory stack bounds violated")]
    MemoryStackBounds,
    /// Division or remainder with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Signed division overflow (`INT32_MIN / -1`).
    #[error("integer overflow")]
    IntegerOverflow,
    /// Shift or rotate amount not below the operand width.
    #[error("shift amount {0} out of range")]
    ShiftOutOfRange(u32),
    /// `HeapFree` of an address that is not a live allocation.
    #[error("free of address {0} which is not a live allocation")]
    BadFree(u32),
    /// Far-call stack exceeded its depth cap.
    #[error("far-call depth limit exceeded")]
    CallDepth,
    /// Far call targeting a contract with no registry entry.
    #[error("contract not found")]
    ContractMissing,
    /// Far call targeting a method the contract does not export.
    #[error("method {0} not exported")]
    NoSuchMethod(u32),
    /// Nested module failed to compile during a far call.
    #[error("far-call target failed to compile: {0}")]
    NestedCompile(CompileError),
    /// `call_ext` with a binding id absent from the active catalog.
    #[error("unknown host binding 0x{0:02x}")]
    UnknownBinding(u32),
    /// Host object handle (hash context, scalar, point) not alive.
    #[error("invalid host object handle {0}")]
    BadHandle(u32),
    /// Variable namespace tag outside the defined set.
    #[error("invalid variable tag {0}")]
    BadVarTag(u8),
    /// Variable key longer than the limit.
    #[error("variable key too long")]
    VarKeyTooLong,
    /// Variable value longer than the limit.
    #[error("variable value too long")]
    VarTooLong,
    /// Inversion of the zero scalar.
    #[error("scalar is not invertible")]
    NotInvertible,
    /// Hash context parameters rejected.
    #[error("invalid hash parameters")]
    BadHashParams,
    /// `FundsUnlock` past the contract's locked balance.
    #[error("locked funds underflow")]
    FundsUnderflow,
    /// Overflow of a locked balance (`FundsLock`) or of an asset's minted
    /// supply (`AssetEmit`).
    #[error("funds overflow")]
    FundsOverflow,
    /// Asset operation by a contract that does not own the asset.
    #[error("asset {0} is not owned by the calling contract")]
    AssetNotOwned(u32),
    /// Contract destruction while reference counters are non-zero.
    #[error("contract is still referenced")]
    ContractReferenced,
    /// Block header requested past the chain tip.
    #[error("no header at height {0}")]
    HeaderMissing(u64),
    /// Explicit abort requested by the contract.
    #[error("halted by contract")]
    Halted,
    /// Charge ceiling crossed.
    #[error("charge ceiling exceeded")]
    OutOfCharge,
}
