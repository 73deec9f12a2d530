//! Instruction set definitions.
//!
//! The executable form keeps the source opcode numbering for every ported
//! instruction and adds two proprietary opcodes: `ret` (function return with
//! explicit frame geometry) and `call_ext` (host binding call). Structured
//! control opcodes (`block`, `loop`, `end`) exist only in source modules;
//! the rewriter never emits them.
//!
//! The [`for_each_op!`](crate::for_each_op) macro holds the canonical
//! definition list and invokes a callback macro for code generation, so the
//! enum, decoding and charge table stay in one place.

use crate::vm::errors::Fault;

/// Invokes a callback macro with the complete instruction definition list:
/// `Name = opcode, "mnemonic", charge`.
#[macro_export]
macro_rules! for_each_op {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Proprietary (emitted by the rewriter only)
            // =========================
            /// ret r l a ; splice r return words over a arg words, pop frame
            Ret = 0x07, "ret", 2,
            /// call_ext b ; invoke host binding b
            CallExt = 0x08, "call_ext", 3,
            // =========================
            // Control
            // =========================
            /// block ; compile-time only
            Block = 0x02, "block", 0,
            /// loop ; compile-time only
            Loop = 0x03, "loop", 0,
            /// end ; compile-time only
            End = 0x0B, "end", 0,
            /// br addr ; unconditional jump to absolute pc
            Br = 0x0C, "br", 1,
            /// br_if addr ; jump when the popped i32 is non-zero
            BrIf = 0x0D, "br_if", 1,
            /// call addr ; push return address and jump
            Call = 0x10, "call", 3,
            // =========================
            // Stack & locals
            // =========================
            /// drop t ; discard one operand of type t
            Drop = 0x1A, "drop", 1,
            /// select t ; pick one of two operands by the popped condition
            Select = 0x1B, "select", 1,
            /// local.get n ; push a local (offset and type packed into n)
            LocalGet = 0x20, "local.get", 1,
            /// local.set n ; pop into a local
            LocalSet = 0x21, "local.set", 1,
            /// local.tee n ; copy the top of stack into a local
            LocalTee = 0x22, "local.tee", 1,
            // =========================
            // Memory (byte width only; wider access goes through host calls)
            // =========================
            /// i32.load8_s a o ; sign-extending byte load
            I32Load8S = 0x2C, "i32.load8_s", 2,
            /// i32.load8_u a o ; zero-extending byte load
            I32Load8U = 0x2D, "i32.load8_u", 2,
            /// i32.store8 a o ; byte store
            I32Store8 = 0x3A, "i32.store8", 2,
            // =========================
            // Constants
            // =========================
            /// i32.const v
            I32Const = 0x41, "i32.const", 1,
            // =========================
            // i32 test / comparison
            // =========================
            I32Eqz = 0x45, "i32.eqz", 1,
            I32Eq = 0x46, "i32.eq", 1,
            I32Ne = 0x47, "i32.ne", 1,
            I32LtS = 0x48, "i32.lt_s", 1,
            I32LtU = 0x49, "i32.lt_u", 1,
            I32GtS = 0x4A, "i32.gt_s", 1,
            I32GtU = 0x4B, "i32.gt_u", 1,
            I32LeS = 0x4C, "i32.le_s", 1,
            I32LeU = 0x4D, "i32.le_u", 1,
            I32GeS = 0x4E, "i32.ge_s", 1,
            I32GeU = 0x4F, "i32.ge_u", 1,
            // =========================
            // i64 test / comparison
            // =========================
            I64Eqz = 0x50, "i64.eqz", 1,
            I64Eq = 0x51, "i64.eq", 1,
            I64Ne = 0x52, "i64.ne", 1,
            I64LtS = 0x53, "i64.lt_s", 1,
            I64LtU = 0x54, "i64.lt_u", 1,
            I64GtS = 0x55, "i64.gt_s", 1,
            I64GtU = 0x56, "i64.gt_u", 1,
            I64LeS = 0x57, "i64.le_s", 1,
            I64LeU = 0x58, "i64.le_u", 1,
            I64GeS = 0x59, "i64.ge_s", 1,
            I64GeU = 0x5A, "i64.ge_u", 1,
            // =========================
            // i32 arithmetic / bitwise
            // =========================
            I32Add = 0x6A, "i32.add", 1,
            I32Sub = 0x6B, "i32.sub", 1,
            I32Mul = 0x6C, "i32.mul", 1,
            I32DivS = 0x6D, "i32.div_s", 4,
            I32DivU = 0x6E, "i32.div_u", 4,
            I32RemS = 0x6F, "i32.rem_s", 4,
            I32RemU = 0x70, "i32.rem_u", 4,
            I32And = 0x71, "i32.and", 1,
            I32Or = 0x72, "i32.or", 1,
            I32Xor = 0x73, "i32.xor", 1,
            I32Shl = 0x74, "i32.shl", 1,
            I32ShrS = 0x75, "i32.shr_s", 1,
            I32ShrU = 0x76, "i32.shr_u", 1,
            I32Rotl = 0x77, "i32.rotl", 1,
            I32Rotr = 0x78, "i32.rotr", 1,
        }
    };
}

#[macro_export]
macro_rules! define_ops {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal, $charge:expr
        ),* $(,)?
    ) => {
        /// One executable-form instruction.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Op {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Op {
            type Error = Fault;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Op::$name), )*
                    _ => Err(Fault::UnknownOpcode(value)),
                }
            }
        }

        impl Op {
            /// Returns the textual mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Op::$name => $mnemonic, )*
                }
            }

            /// Returns the charge debited for executing this instruction.
            pub const fn charge(&self) -> u64 {
                match self {
                    $( Op::$name => $charge, )*
                }
            }
        }
    };
}

for_each_op!(define_ops);

/// Value type tags as they appear in module signatures.
pub mod value_type {
    pub const I32: u8 = 0x7F;
    pub const I64: u8 = 0x7E;
    pub const F32: u8 = 0x7D;
    pub const F64: u8 = 0x7C;

    /// Base for the 2-bit type encoding packed into local offsets.
    pub const BASE: u8 = 0x7C;

    /// Size in bytes of a value of the given type tag, `None` for an
    /// unknown tag.
    pub const fn size_of(tag: u8) -> Option<u32> {
        match tag {
            I32 | F32 => Some(4),
            I64 | F64 => Some(8),
            _ => None,
        }
    }
}

/// Returns true for source opcodes that belong to the floating-point part of
/// the instruction set. They are recognized so the loader can reject them
/// with a dedicated error instead of a generic unknown-opcode one.
pub fn is_float_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        0x2A | 0x2B                 // f32/f64.load
        | 0x38 | 0x39               // f32/f64.store
        | 0x43 | 0x44               // f32/f64.const
        | 0x5B..=0x66               // f32/f64 comparisons
        | 0x8B..=0xA6               // f32/f64 arithmetic
        | 0xA8..=0xAB               // i32.trunc_f*
        | 0xAE..=0xBF               // i64.trunc_f*, conversions, reinterprets
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_try_from_invalid() {
        assert!(matches!(Op::try_from(0xFF), Err(Fault::UnknownOpcode(0xFF))));
    }

    #[test]
    fn op_roundtrips_through_opcode() {
        assert_eq!(Op::try_from(0x6A).unwrap(), Op::I32Add);
        assert_eq!(Op::I32Add.mnemonic(), "i32.add");
    }

    #[test]
    fn value_type_sizes() {
        assert_eq!(value_type::size_of(value_type::I32), Some(4));
        assert_eq!(value_type::size_of(value_type::I64), Some(8));
        assert_eq!(value_type::size_of(value_type::F64), Some(8));
        assert_eq!(value_type::size_of(0x60), None);
    }

    #[test]
    fn float_opcodes_are_recognized() {
        assert!(is_float_opcode(0x43)); // f32.const
        assert!(is_float_opcode(0x92)); // f32.add
        assert!(!is_float_opcode(0x6A)); // i32.add
        assert!(!is_float_opcode(0xAC)); // i64.extend_i32_s
    }
}
