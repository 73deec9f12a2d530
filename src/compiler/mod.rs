//! Module loader and instruction rewriter.
//!
//! Parses a module in the source bytecode format (magic header, version,
//! typed sections) and rewrites it into a compact executable image: a flat
//! instruction stream with absolute branch targets, word-offset local
//! references and resolved host bindings. Compilation is the only place
//! where names, structured control flow and type checking exist; the
//! interpreter sees none of them.

pub mod errors;
pub mod image;

mod build;
mod reader;

#[cfg(test)]
mod tests;

use crate::compiler::errors::CompileError;
use crate::compiler::image::{ExecImage, FuncType, ImportEntry};
use crate::compiler::reader::Reader;
use crate::host::bindings::{self, Kind};
use crate::vm::ops::value_type;
use crate::vm::Limits;

/// Module magic: `\0asm`.
const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// Binary format version 1.
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Section ids recognized by the loader.
mod section {
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCS: u8 = 3;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const CODE: u8 = 10;
}

/// One declared local (or argument) of a function, at a fixed byte position
/// within the frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalVar {
    pub tag: u8,
    /// Byte offset from the frame base (arguments first).
    pub pos: u32,
}

/// A function body awaiting rewrite.
#[derive(Debug)]
pub(crate) struct FuncBody {
    pub locals: Vec<LocalVar>,
    /// Combined size of arguments and locals in bytes.
    pub locals_bytes: u32,
    /// Expression byte range within the module input.
    pub expr_start: usize,
    pub expr_end: usize,
}

/// Fully parsed module, ready for the rewrite pass.
#[derive(Debug)]
pub(crate) struct ParsedModule {
    pub types: Vec<FuncType>,
    pub imports: Vec<ImportEntry>,
    /// Function index → type index.
    pub func_types: Vec<u32>,
    /// `(method number, function index)`, sorted by method number.
    pub methods: Vec<(u32, u32)>,
    pub bodies: Vec<FuncBody>,
}

/// Compiles a source module into an executable image.
///
/// `kind` selects the host catalog imports resolve against. No partial image
/// is ever returned: any malformed input, unresolved import or validation
/// failure yields a [`CompileError`].
pub fn compile(input: &[u8], kind: Kind) -> Result<ExecImage, CompileError> {
    let mut r = Reader::new(input);

    if r.bytes(MAGIC.len())? != MAGIC {
        return Err(CompileError::BadMagic);
    }
    if r.bytes(VERSION.len())? != VERSION {
        return Err(CompileError::BadVersion);
    }

    let mut module = ParsedModule {
        types: Vec::new(),
        imports: Vec::new(),
        func_types: Vec::new(),
        methods: Vec::new(),
        bodies: Vec::new(),
    };

    let mut prev_section = 0u8;
    while !r.is_empty() {
        let id = r.byte()?;
        if prev_section != 0 && id != 0 && id <= prev_section {
            return Err(CompileError::SectionOrder(id));
        }
        let len = r.uleb32()? as usize;
        let mut sec = r.sub(len)?;

        let recognized = match id {
            section::TYPE => {
                parse_types(&mut sec, &mut module)?;
                true
            }
            section::IMPORT => {
                parse_imports(&mut sec, &mut module, kind)?;
                true
            }
            section::FUNCS => {
                parse_funcs(&mut sec, &mut module)?;
                true
            }
            section::GLOBAL => {
                parse_globals(&mut sec)?;
                true
            }
            section::EXPORT => {
                parse_exports(&mut sec, &mut module)?;
                true
            }
            section::CODE => {
                parse_code(&mut sec, &mut module)?;
                true
            }
            // Custom and unrecognized sections are skipped; `sub` above
            // already consumed their payload.
            _ => false,
        };
        if recognized && !sec.is_empty() {
            return Err(CompileError::SectionTrailing(id));
        }
        if id != 0 {
            prev_section = id;
        }
    }

    if module.bodies.len() != module.func_types.len() {
        return Err(CompileError::Truncated);
    }

    let (code, funcs) = build::build(&module, input)?;

    Ok(ExecImage {
        code,
        funcs,
        func_types: module.func_types,
        types: module.types,
        imports: module.imports,
        methods: module.methods,
    })
}

fn check_value_type(tag: u8) -> Result<u8, CompileError> {
    value_type::size_of(tag)
        .map(|_| tag)
        .ok_or(CompileError::BadValueType(tag))
}

fn parse_types(r: &mut Reader, module: &mut ParsedModule) -> Result<(), CompileError> {
    let count = r.uleb32()?;
    for _ in 0..count {
        if r.byte()? != 0x60 {
            return Err(CompileError::BadTypeForm);
        }

        let n_args = r.uleb32()?;
        let mut args = Vec::with_capacity(n_args as usize);
        for _ in 0..n_args {
            args.push(check_value_type(r.byte()?)?);
        }

        let n_rets = r.uleb32()?;
        if n_rets > 1 {
            return Err(CompileError::TooManyResults);
        }
        let ret = if n_rets == 1 {
            Some(check_value_type(r.byte()?)?)
        } else {
            None
        };

        module.types.push(FuncType { args, ret });
    }
    Ok(())
}

fn parse_imports(
    r: &mut Reader,
    module: &mut ParsedModule,
    kind: Kind,
) -> Result<(), CompileError> {
    let count = r.uleb32()?;
    for _ in 0..count {
        let mod_name = r.name()?;
        let name = r.name()?;

        // Only function imports are supported.
        let import_kind = r.byte()?;
        if import_kind != 0 {
            return Err(CompileError::BadImportKind(import_kind));
        }

        let type_idx = r.uleb32()?;
        let ty = module
            .types
            .get(type_idx as usize)
            .ok_or(CompileError::IndexOutOfRange(type_idx))?;

        let binding = bindings::resolve(kind, &mod_name, &name).ok_or_else(|| {
            CompileError::UnresolvedImport {
                module: mod_name.clone(),
                name: name.clone(),
            }
        })?;
        if !binding.signature_matches(ty) {
            return Err(CompileError::ImportSignature { name });
        }

        module.imports.push(ImportEntry {
            module: mod_name,
            name,
            type_idx,
            binding: binding.id,
        });
    }
    Ok(())
}

fn parse_funcs(r: &mut Reader, module: &mut ParsedModule) -> Result<(), CompileError> {
    let count = r.uleb32()?;
    for _ in 0..count {
        let type_idx = r.uleb32()?;
        if type_idx as usize >= module.types.len() {
            return Err(CompileError::IndexOutOfRange(type_idx));
        }
        module.func_types.push(type_idx);
    }
    Ok(())
}

fn parse_globals(r: &mut Reader) -> Result<(), CompileError> {
    // Initializer expressions are not supported, so any declared global is.
    if r.uleb32()? != 0 {
        return Err(CompileError::GlobalsUnsupported);
    }
    Ok(())
}

/// Maps an export name onto a method number: `Ctor` is 0, `Dtor` is 1,
/// `Method_<n>` is n. Anything else is not a method.
fn method_index(name: &str) -> Option<u32> {
    match name {
        "Ctor" => Some(0),
        "Dtor" => Some(1),
        _ => name.strip_prefix("Method_")?.parse().ok(),
    }
}

fn parse_exports(r: &mut Reader, module: &mut ParsedModule) -> Result<(), CompileError> {
    let count = r.uleb32()?;
    for _ in 0..count {
        let name = r.name()?;
        let kind = r.byte()?;
        let idx = r.uleb32()?;

        // Non-function exports are ignored.
        if kind != 0 {
            continue;
        }
        let func_idx = idx
            .checked_sub(module.imports.len() as u32)
            .ok_or(CompileError::IndexOutOfRange(idx))?;
        if func_idx as usize >= module.func_types.len() {
            return Err(CompileError::IndexOutOfRange(idx));
        }

        if let Some(method) = method_index(&name) {
            match module.methods.binary_search_by_key(&method, |&(m, _)| m) {
                Ok(_) => return Err(CompileError::DuplicateMethod(method)),
                Err(slot) => module.methods.insert(slot, (method, func_idx)),
            }
        }
    }
    Ok(())
}

fn parse_code(r: &mut Reader, module: &mut ParsedModule) -> Result<(), CompileError> {
    let count = r.uleb32()?;
    if count as usize != module.func_types.len() {
        return Err(CompileError::IndexOutOfRange(count));
    }

    for func_idx in 0..count as usize {
        let size = r.uleb32()? as usize;
        let mut body = r.sub(size)?;
        let body_end = body.pos() + size;

        let ty = &module.types[module.func_types[func_idx] as usize];
        let mut locals = Vec::new();
        let mut pos = 0u32;
        for &tag in &ty.args {
            locals.push(LocalVar { tag, pos });
            pos += value_type::size_of(tag).expect("validated");
        }

        let n_blocks = body.uleb32()?;
        for _ in 0..n_blocks {
            let n_vars = body.uleb32()?;
            let tag = check_value_type(body.byte()?)?;
            let var_size = value_type::size_of(tag).expect("validated");
            for _ in 0..n_vars {
                locals.push(LocalVar { tag, pos });
                pos += var_size;
                if pos > Limits::LOCAL_FRAME_SIZE {
                    return Err(CompileError::OversizedFrame);
                }
            }
        }

        module.bodies.push(FuncBody {
            locals,
            locals_bytes: pos,
            expr_start: body.pos(),
            expr_end: body_end,
        });
    }
    Ok(())
}
