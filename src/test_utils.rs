//! Test utilities: building source modules byte by byte.

use crate::vm::ops::value_type::I32;

/// Unsigned LEB128 encoding.
pub fn uleb(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out
}

/// Signed LEB128 encoding.
pub fn sleb(mut value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out
}

/// Builds a source module section by section.
///
/// Function bodies are passed as raw instruction bytes; the final `end`
/// opcode is appended automatically.
pub struct ModuleBuilder {
    types: Vec<(Vec<u8>, Option<u8>)>,
    imports: Vec<(String, u32)>,
    funcs: Vec<u32>,
    exports: Vec<(String, u32)>,
    bodies: Vec<(Vec<(u32, u8)>, Vec<u8>)>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            imports: Vec::new(),
            funcs: Vec::new(),
            exports: Vec::new(),
            bodies: Vec::new(),
        }
    }

    /// Declares a function type, returning its index.
    pub fn ty(&mut self, args: &[u8], ret: Option<u8>) -> u32 {
        self.types.push((args.to_vec(), ret));
        (self.types.len() - 1) as u32
    }

    /// Imports a host function from `env`, returning its function index.
    /// All imports must be declared before any internal function.
    pub fn import(&mut self, name: &str, type_idx: u32) -> u32 {
        assert!(self.funcs.is_empty(), "imports come first");
        self.imports.push((name.to_string(), type_idx));
        (self.imports.len() - 1) as u32
    }

    /// Adds an internal function, returning its absolute index (imports
    /// included, as `call` sees it).
    pub fn func(&mut self, type_idx: u32, locals: &[(u32, u8)], body: &[u8]) -> u32 {
        self.funcs.push(type_idx);
        let mut expr = body.to_vec();
        expr.push(0x0B);
        self.bodies.push((locals.to_vec(), expr));
        (self.imports.len() + self.funcs.len() - 1) as u32
    }

    /// Exports a function under the given name.
    pub fn export(&mut self, name: &str, func_idx: u32) -> &mut Self {
        self.exports.push((name.to_string(), func_idx));
        self
    }

    /// Exports a function as `Method_<n>`.
    pub fn method(&mut self, n: u32, func_idx: u32) -> &mut Self {
        self.export(&format!("Method_{}", n), func_idx)
    }

    fn name(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&uleb(s.len() as u64));
        out.extend_from_slice(s.as_bytes());
    }

    fn section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
        out.push(id);
        out.extend_from_slice(&uleb(payload.len() as u64));
        out.extend_from_slice(payload);
    }

    /// Serializes the module.
    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

        if !self.types.is_empty() {
            let mut p = uleb(self.types.len() as u64);
            for (args, ret) in &self.types {
                p.push(0x60);
                p.extend_from_slice(&uleb(args.len() as u64));
                p.extend_from_slice(args);
                match ret {
                    Some(tag) => {
                        p.push(1);
                        p.push(*tag);
                    }
                    None => p.push(0),
                }
            }
            Self::section(&mut out, 1, &p);
        }

        if !self.imports.is_empty() {
            let mut p = uleb(self.imports.len() as u64);
            for (name, type_idx) in &self.imports {
                Self::name(&mut p, "env");
                Self::name(&mut p, name);
                p.push(0x00);
                p.extend_from_slice(&uleb(u64::from(*type_idx)));
            }
            Self::section(&mut out, 2, &p);
        }

        if !self.funcs.is_empty() {
            let mut p = uleb(self.funcs.len() as u64);
            for type_idx in &self.funcs {
                p.extend_from_slice(&uleb(u64::from(*type_idx)));
            }
            Self::section(&mut out, 3, &p);
        }

        if !self.exports.is_empty() {
            let mut p = uleb(self.exports.len() as u64);
            for (name, func_idx) in &self.exports {
                Self::name(&mut p, name);
                p.push(0x00);
                p.extend_from_slice(&uleb(u64::from(*func_idx)));
            }
            Self::section(&mut out, 7, &p);
        }

        if !self.bodies.is_empty() {
            let mut p = uleb(self.bodies.len() as u64);
            for (locals, expr) in &self.bodies {
                let mut body = uleb(locals.len() as u64);
                for (count, tag) in locals {
                    body.extend_from_slice(&uleb(u64::from(*count)));
                    body.push(*tag);
                }
                body.extend_from_slice(expr);
                p.extend_from_slice(&uleb(body.len() as u64));
                p.extend_from_slice(&body);
            }
            Self::section(&mut out, 10, &p);
        }

        out
    }
}

/// `Method_2(i32, i32) → i32` computing `a + b * 2`, the canonical
/// arithmetic fixture.
pub fn arithmetic_module() -> Vec<u8> {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I32, I32], Some(I32));
    let body = [
        &[0x20][..],
        &uleb(0), // local.get 0
        &[0x20],
        &uleb(1), // local.get 1
        &[0x41],
        &sleb(2), // i32.const 2
        &[0x6C],  // i32.mul
        &[0x6A],  // i32.add
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    m.build()
}

/// `Method_2()` looping forever: `loop br 0 end`.
pub fn infinite_loop_module() -> Vec<u8> {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let body = [
        &[0x03, 0x40][..], // loop (void)
        &[0x0C],
        &uleb(0), // br 0
        &[0x0B],  // end
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    m.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb_matches_reference_values() {
        assert_eq!(uleb(0), vec![0x00]);
        assert_eq!(uleb(127), vec![0x7F]);
        assert_eq!(uleb(128), vec![0x80, 0x01]);
        assert_eq!(uleb(624_485), vec![0xE5, 0x8E, 0x26]);
    }

    #[test]
    fn sleb_matches_reference_values() {
        assert_eq!(sleb(0), vec![0x00]);
        assert_eq!(sleb(2), vec![0x02]);
        assert_eq!(sleb(-1), vec![0x7F]);
        assert_eq!(sleb(63), vec![0x3F]);
        assert_eq!(sleb(64), vec![0xC0, 0x00]);
        assert_eq!(sleb(-123_456), vec![0xC0, 0xBB, 0x78]);
    }

    #[test]
    fn builder_emits_magic_and_version() {
        let m = ModuleBuilder::new().build();
        assert_eq!(&m[..8], &[0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]);
    }
}
