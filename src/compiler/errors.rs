//! Compile-time error taxonomy.

use contract_vm_derive::Error;

/// A reason the loader rejected a module. Compilation is all-or-nothing: no
/// partial executable image is ever produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// Input ended before expected data was read.
    #[error("truncated module")]
    Truncated,
    /// Module does not start with `\0asm`.
    #[error("bad magic")]
    BadMagic,
    /// Binary format version other than 1.
    #[error("unsupported module version")]
    BadVersion,
    /// Non-custom sections must appear in strictly ascending id order.
    #[error("section {0} out of order")]
    SectionOrder(u8),
    /// Section payload length does not match its content.
    #[error("section {0} has trailing bytes")]
    SectionTrailing(u8),
    /// Function type does not start with the `0x60` form byte.
    #[error("malformed function type")]
    BadTypeForm,
    /// Unknown value type tag in a signature or locals declaration.
    #[error("unknown value type 0x{0:02x}")]
    BadValueType(u8),
    /// Functions may return at most one value.
    #[error("multi-value returns are not supported")]
    TooManyResults,
    /// Type, function or import index out of range.
    #[error("index {0} out of range")]
    IndexOutOfRange(u32),
    /// Non-function import (memory, table, global).
    #[error("unsupported import kind {0}")]
    BadImportKind(u8),
    /// Import does not resolve against the host catalog.
    #[error("unresolved import {module}.{name}")]
    UnresolvedImport { module: String, name: String },
    /// Import resolves but its signature differs from the catalog.
    #[error("import {name} signature mismatch")]
    ImportSignature { name: String },
    /// Import or export name is not valid UTF-8.
    #[error("malformed name")]
    BadName,
    /// Global variables are not supported.
    #[error("globals are not supported")]
    GlobalsUnsupported,
    /// Two exports map to the same method number.
    #[error("method {0} exported more than once")]
    DuplicateMethod(u32),
    /// Combined arguments and locals exceed the frame limit.
    #[error("local frame too large")]
    OversizedFrame,
    /// Source opcode outside the supported subset.
    #[error("unsupported opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    /// Floating-point instruction encountered; float types are accepted in
    /// signatures but float code never is.
    #[error("floating-point opcode 0x{0:02x} is not supported")]
    FloatOpcode(u8),
    /// Only void block types are supported.
    #[error("unsupported block type")]
    BadBlockType,
    /// Branch label deeper than the enclosing block stack.
    #[error("branch depth {0} out of scope")]
    BadBranchDepth(u32),
    /// Local index outside the declared frame.
    #[error("local index {0} out of range")]
    BadLocalIndex(u32),
    /// Operand type stack does not match the instruction's signature.
    #[error("operand type mismatch at {mnemonic}")]
    TypeMismatch { mnemonic: &'static str },
    /// Operand stack shape at a block boundary does not match the block
    /// signature.
    #[error("operand stack does not match block signature")]
    StackImbalance,
    /// Code for a function ran out before its outermost block closed.
    #[error("function body ended inside a block")]
    UnbalancedBlocks,
}
