//! The rewrite pass: one walk over every function body that type-checks the
//! code and emits the executable form.
//!
//! Structured control flow is resolved here. Every `block`/`loop` gets a
//! label; `br`/`br_if` sites emit a 4-byte absolute target slot that is
//! back-patched once all functions are placed. Function entries are labels
//! too, so internal calls patch the same way.

use crate::compiler::errors::CompileError;
use crate::compiler::reader::Reader;
use crate::compiler::{FuncBody, ParsedModule};
use crate::vm::ops::{is_float_opcode, value_type, Op};

/// Runs the rewrite pass. Returns the instruction stream and the per-function
/// entry pcs.
pub(crate) fn build(
    module: &ParsedModule,
    input: &[u8],
) -> Result<(Vec<u8>, Vec<u32>), CompileError> {
    let mut out = Output {
        code: Vec::new(),
        // The first `funcs` labels are function entries.
        labels: vec![0; module.func_types.len()],
        fixups: Vec::new(),
    };

    for func_idx in 0..module.func_types.len() {
        out.labels[func_idx] = out.code.len() as u32;
        FuncCompiler::new(module, func_idx, input, &mut out)?.run()?;
    }

    for &(label, pos) in &out.fixups {
        let target = out.labels[label as usize].to_le_bytes();
        out.code[pos..pos + 4].copy_from_slice(&target);
    }

    let funcs = out.labels[..module.func_types.len()].to_vec();
    Ok((out.code, funcs))
}

struct Output {
    code: Vec<u8>,
    labels: Vec<u32>,
    /// `(label index, code position of the 4-byte slot)`.
    fixups: Vec<(u32, usize)>,
}

impl Output {
    fn emit(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn emit_slice(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn emit_uleb(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.emit(byte);
                break;
            }
            self.emit(byte | 0x80);
        }
    }

    fn new_label(&mut self) -> u32 {
        self.labels.push(0);
        (self.labels.len() - 1) as u32
    }

    fn place_label(&mut self, label: u32) {
        self.labels[label as usize] = self.code.len() as u32;
    }

    fn emit_target(&mut self, label: u32) {
        self.fixups.push((label, self.code.len()));
        self.emit_slice(&[0; 4]);
    }
}

/// One block on the structured-control stack.
struct Block {
    args: Vec<u8>,
    ret: Option<u8>,
    /// Expected operand-stack depth when the block exits.
    operands_at_exit: usize,
    label: u32,
    is_loop: bool,
}

impl Block {
    fn rets_n(&self) -> usize {
        self.ret.is_some() as usize
    }
}

struct FuncCompiler<'a, 'o> {
    module: &'a ParsedModule,
    body: &'a FuncBody,
    /// Argument count of the function (a prefix of `body.locals`).
    n_args: usize,
    r: Reader<'a>,
    out: &'o mut Output,
    blocks: Vec<Block>,
    /// Operand type stack.
    operands: Vec<u8>,
    /// Combined operand size in bytes, used for local offsets.
    operand_bytes: u32,
}

impl<'a, 'o> FuncCompiler<'a, 'o> {
    fn new(
        module: &'a ParsedModule,
        func_idx: usize,
        input: &'a [u8],
        out: &'o mut Output,
    ) -> Result<Self, CompileError> {
        let body = &module.bodies[func_idx];
        let ty = &module.types[module.func_types[func_idx] as usize];

        let mut this = Self {
            module,
            body,
            n_args: ty.args.len(),
            r: Reader::window(input, body.expr_start, body.expr_end),
            out,
            blocks: Vec::new(),
            operands: Vec::new(),
            operand_bytes: 0,
        };
        this.block_open(ty.args.clone(), ty.ret, true)?;
        Ok(this)
    }

    fn push_t(&mut self, tag: u8) {
        self.operands.push(tag);
        self.operand_bytes += value_type::size_of(tag).expect("validated");
    }

    fn pop_any(&mut self, mnemonic: &'static str) -> Result<u8, CompileError> {
        let tag = self
            .operands
            .pop()
            .ok_or(CompileError::TypeMismatch { mnemonic })?;
        self.operand_bytes -= value_type::size_of(tag).expect("validated");
        Ok(tag)
    }

    fn pop_t(&mut self, expect: u8, mnemonic: &'static str) -> Result<(), CompileError> {
        if self.pop_any(mnemonic)? != expect {
            return Err(CompileError::TypeMismatch { mnemonic });
        }
        Ok(())
    }

    /// Whether the operand stack ends with the given type list.
    fn tail_matches(&self, tail: &[u8]) -> bool {
        self.operands.len() >= tail.len()
            && self.operands[self.operands.len() - tail.len()..] == *tail
    }

    fn block_open(
        &mut self,
        args: Vec<u8>,
        ret: Option<u8>,
        is_outer: bool,
    ) -> Result<(), CompileError> {
        let mut operands_at_exit = self.operands.len();
        let mut label = 0;

        if !is_outer {
            // For the outermost (function) block the arguments live in the
            // locals area, not on the operand stack.
            if !self.tail_matches(&args) {
                return Err(CompileError::StackImbalance);
            }
            operands_at_exit -= args.len();
            label = self.out.new_label();
        }
        operands_at_exit += ret.is_some() as usize;

        self.blocks.push(Block {
            args,
            ret,
            operands_at_exit,
            label,
            is_loop: false,
        });
        Ok(())
    }

    /// Reads a block type immediate; only the void form is supported.
    fn read_void_block_type(&mut self) -> Result<(), CompileError> {
        if self.r.uleb32()? != 0x40 {
            return Err(CompileError::BadBlockType);
        }
        Ok(())
    }

    fn top_block(&self) -> &Block {
        self.blocks.last().expect("block stack is never empty here")
    }

    fn check_block_can_close(&self) -> Result<(), CompileError> {
        let b = self.top_block();
        if self.operands.len() != b.operands_at_exit {
            return Err(CompileError::StackImbalance);
        }
        let rets: &[u8] = match &b.ret {
            Some(t) => std::slice::from_ref(t),
            None => &[],
        };
        if !self.tail_matches(rets) {
            return Err(CompileError::StackImbalance);
        }
        Ok(())
    }

    fn block_close(&mut self) -> Result<(), CompileError> {
        self.check_block_can_close()?;

        if self.blocks.len() == 1 {
            self.write_ret();
        } else {
            let b = self.top_block();
            if !b.is_loop {
                let label = b.label;
                self.out.place_label(label);
            }
        }
        self.blocks.pop();
        Ok(())
    }

    /// Emits the proprietary return: the interpreter needs the frame
    /// geometry to splice return values over the arguments and restore the
    /// caller's stack pointer.
    fn write_ret(&mut self) {
        let b = self.blocks.last().expect("called inside the outer block");
        let ret_words: u32 = b
            .ret
            .map(|t| value_type::size_of(t).expect("validated") / 4)
            .unwrap_or(0);
        let args_bytes: u32 = b
            .args
            .iter()
            .map(|&t| value_type::size_of(t).expect("validated"))
            .sum();

        self.out.emit(Op::Ret as u8);
        self.out.emit_uleb(ret_words as u64);
        self.out
            .emit_uleb(((self.body.locals_bytes - args_bytes) / 4) as u64);
        self.out.emit_uleb((args_bytes / 4) as u64);
    }

    fn branch(&mut self, opcode: u8) -> Result<(), CompileError> {
        let depth = self.r.uleb32()?;
        if depth as usize + 1 >= self.blocks.len() {
            return Err(CompileError::BadBranchDepth(depth));
        }

        let b = self.top_block();
        if b.is_loop {
            // Branch re-enters some loop; the innermost block must hold
            // exactly its entry operands.
            let expected = b.operands_at_exit + b.args.len() - b.rets_n();
            if self.operands.len() != expected || !self.tail_matches(&b.args.clone()) {
                return Err(CompileError::StackImbalance);
            }
        } else {
            self.check_block_can_close()?;
        }

        let target = self.blocks[self.blocks.len() - 1 - depth as usize].label;
        self.out.emit(opcode);
        self.out.emit_target(target);
        Ok(())
    }

    /// Rewrites a local reference into its packed stack-relative form.
    fn local_ref(&mut self, opcode: u8) -> Result<u8, CompileError> {
        let idx = self.r.uleb32()?;
        let var = self
            .body
            .locals
            .get(idx as usize)
            .copied()
            .ok_or(CompileError::BadLocalIndex(idx))?;

        // Distance in bytes from the current stack top down to the variable.
        // Arguments sit below the return address, hence one extra word.
        let mut offset = self.operand_bytes + self.body.locals_bytes - var.pos;
        if (idx as usize) < self.n_args {
            offset += 4;
        }
        debug_assert_eq!(offset & 3, 0);

        self.out.emit(opcode);
        self.out
            .emit_uleb(u64::from(offset | u32::from(var.tag - value_type::BASE)));
        Ok(var.tag)
    }

    fn call(&mut self) -> Result<(), CompileError> {
        let idx = self.r.uleb32()?;
        let imported = (idx as usize) < self.module.imports.len();

        let type_idx = if imported {
            self.module.imports[idx as usize].type_idx
        } else {
            let func_idx = idx - self.module.imports.len() as u32;
            *self
                .module
                .func_types
                .get(func_idx as usize)
                .ok_or(CompileError::IndexOutOfRange(idx))?
        };
        let ty = &self.module.types[type_idx as usize];

        for i in (0..ty.args.len()).rev() {
            self.pop_t(ty.args[i], "call")?;
        }
        if let Some(ret) = ty.ret {
            self.push_t(ret);
        }

        if imported {
            let binding = self.module.imports[idx as usize].binding;
            self.out.emit(Op::CallExt as u8);
            self.out.emit_uleb(u64::from(binding));
        } else {
            let func_idx = idx - self.module.imports.len() as u32;
            self.out.emit(Op::Call as u8);
            self.out.emit_target(func_idx);
        }
        Ok(())
    }

    fn run(mut self) -> Result<(), CompileError> {
        use value_type::{I32, I64};

        while !self.blocks.is_empty() {
            if self.r.is_empty() {
                return Err(CompileError::UnbalancedBlocks);
            }
            let start = self.r.pos();
            let opcode = self.r.byte()?;
            let op = Op::try_from(opcode).map_err(|_| {
                if is_float_opcode(opcode) {
                    CompileError::FloatOpcode(opcode)
                } else {
                    CompileError::UnknownOpcode(opcode)
                }
            })?;

            match op {
                Op::Block => {
                    self.read_void_block_type()?;
                    self.block_open(Vec::new(), None, false)?;
                }
                Op::Loop => {
                    self.read_void_block_type()?;
                    self.block_open(Vec::new(), None, false)?;
                    let b = self.blocks.last_mut().expect("just pushed");
                    b.is_loop = true;
                    let label = b.label;
                    self.out.place_label(label);
                }
                Op::End => self.block_close()?,
                Op::Br => self.branch(opcode)?,
                Op::BrIf => {
                    self.pop_t(I32, "br_if")?;
                    self.branch(opcode)?;
                }
                Op::LocalGet => {
                    let tag = self.local_ref(opcode)?;
                    self.push_t(tag);
                }
                Op::LocalSet => {
                    let tag = self.local_ref(opcode)?;
                    self.pop_t(tag, "local.set")?;
                }
                Op::LocalTee => {
                    let tag = self.local_ref(opcode)?;
                    self.pop_t(tag, "local.tee")?;
                    self.push_t(tag);
                }
                Op::Drop => {
                    let tag = self.pop_any("drop")?;
                    self.out.emit(opcode);
                    self.out.emit(tag);
                }
                Op::Select => {
                    self.pop_t(I32, "select")?;
                    let tag = self.pop_any("select")?;
                    self.pop_t(tag, "select")?;
                    self.push_t(tag);
                    self.out.emit(opcode);
                    self.out.emit(tag);
                }
                Op::I32Load8S | Op::I32Load8U => {
                    self.r.uleb32()?; // alignment hint
                    self.r.uleb32()?; // static offset
                    self.pop_t(I32, "i32.load8")?;
                    self.push_t(I32);
                    let end = self.r.pos();
                    self.out.emit_slice(self.r.span(start, end));
                }
                Op::I32Store8 => {
                    self.r.uleb32()?;
                    self.r.uleb32()?;
                    self.pop_t(I32, "i32.store8")?;
                    self.pop_t(I32, "i32.store8")?;
                    let end = self.r.pos();
                    self.out.emit_slice(self.r.span(start, end));
                }
                Op::I32Const => {
                    self.r.sleb64()?;
                    self.push_t(I32);
                    let end = self.r.pos();
                    self.out.emit_slice(self.r.span(start, end));
                }
                Op::Call => self.call()?,
                // The proprietary opcodes never appear in source modules.
                Op::Ret | Op::CallExt => {
                    return Err(CompileError::UnknownOpcode(opcode));
                }
                Op::I32Eqz => {
                    self.pop_t(I32, op.mnemonic())?;
                    self.push_t(I32);
                    self.out.emit(opcode);
                }
                Op::I64Eqz => {
                    self.pop_t(I64, op.mnemonic())?;
                    self.push_t(I32);
                    self.out.emit(opcode);
                }
                Op::I32Eq
                | Op::I32Ne
                | Op::I32LtS
                | Op::I32LtU
                | Op::I32GtS
                | Op::I32GtU
                | Op::I32LeS
                | Op::I32LeU
                | Op::I32GeS
                | Op::I32GeU
                | Op::I32Add
                | Op::I32Sub
                | Op::I32Mul
                | Op::I32DivS
                | Op::I32DivU
                | Op::I32RemS
                | Op::I32RemU
                | Op::I32And
                | Op::I32Or
                | Op::I32Xor
                | Op::I32Shl
                | Op::I32ShrS
                | Op::I32ShrU
                | Op::I32Rotl
                | Op::I32Rotr => {
                    self.pop_t(I32, op.mnemonic())?;
                    self.pop_t(I32, op.mnemonic())?;
                    self.push_t(I32);
                    self.out.emit(opcode);
                }
                Op::I64Eq
                | Op::I64Ne
                | Op::I64LtS
                | Op::I64LtU
                | Op::I64GtS
                | Op::I64GtU
                | Op::I64LeS
                | Op::I64LeU
                | Op::I64GeS
                | Op::I64GeU => {
                    self.pop_t(I64, op.mnemonic())?;
                    self.pop_t(I64, op.mnemonic())?;
                    self.push_t(I32);
                    self.out.emit(opcode);
                }
            }
        }

        if !self.r.is_empty() {
            return Err(CompileError::UnbalancedBlocks);
        }
        Ok(())
    }
}
