//! The executable image produced by compilation.

use crate::vm::ops::value_type;

/// Signature of a function: argument type tags and at most one result tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub args: Vec<u8>,
    pub ret: Option<u8>,
}

impl FuncType {
    /// Combined size of the arguments in 32-bit words.
    pub fn args_words(&self) -> u32 {
        self.args
            .iter()
            .map(|&t| value_type::size_of(t).unwrap_or(0) / 4)
            .sum()
    }

    /// Size of the result in 32-bit words (0 for void).
    pub fn ret_words(&self) -> u32 {
        self.ret
            .map(|t| value_type::size_of(t).unwrap_or(0) / 4)
            .unwrap_or(0)
    }
}

/// One resolved host-function import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub module: String,
    pub name: String,
    pub type_idx: u32,
    /// Numeric id in the host catalog; baked into `call_ext` sites.
    pub binding: u32,
}

/// Immutable result of compiling a module: a flat instruction stream with
/// resolved branch targets, plus the tables the driver and the host need to
/// enter it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecImage {
    /// Rewritten instruction stream.
    pub code: Vec<u8>,
    /// Function index → entry pc.
    pub funcs: Vec<u32>,
    /// Function index → type index.
    pub func_types: Vec<u32>,
    /// Type table.
    pub types: Vec<FuncType>,
    /// Resolved imports, in declaration order.
    pub imports: Vec<ImportEntry>,
    /// `(method number, function index)`, sorted by method number.
    pub methods: Vec<(u32, u32)>,
}

impl ExecImage {
    /// Function index of an exported method, if present.
    pub fn method_func(&self, method: u32) -> Option<u32> {
        self.methods
            .binary_search_by_key(&method, |&(m, _)| m)
            .ok()
            .map(|i| self.methods[i].1)
    }

    /// Entry pc of an exported method, if present.
    pub fn method_entry(&self, method: u32) -> Option<u32> {
        self.method_func(method).map(|f| self.funcs[f as usize])
    }

    /// Signature of an exported method, if present.
    pub fn method_type(&self, method: u32) -> Option<&FuncType> {
        self.method_func(method)
            .map(|f| &self.types[self.func_types[f as usize] as usize])
    }
}
