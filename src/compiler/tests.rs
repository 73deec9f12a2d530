use super::*;
use crate::test_utils::{arithmetic_module, sleb, uleb, ModuleBuilder};
use crate::vm::ops::value_type::{F64, I32, I64};

fn compile_contract(bytes: &[u8]) -> Result<ExecImage, CompileError> {
    compile(bytes, Kind::Contract)
}

// ==================== Header ====================

#[test]
fn empty_module_compiles() {
    let image = compile_contract(&ModuleBuilder::new().build()).unwrap();
    assert!(image.code.is_empty());
    assert!(image.funcs.is_empty());
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = ModuleBuilder::new().build();
    bytes[0] = 0xFF;
    assert_eq!(compile_contract(&bytes), Err(CompileError::BadMagic));
}

#[test]
fn rejects_bad_version() {
    let mut bytes = ModuleBuilder::new().build();
    bytes[4] = 0x02;
    assert_eq!(compile_contract(&bytes), Err(CompileError::BadVersion));
}

#[test]
fn rejects_truncated_header() {
    assert_eq!(
        compile_contract(&[0x00, 0x61, 0x73]),
        Err(CompileError::Truncated)
    );
}

// ==================== Sections ====================

#[test]
fn rejects_out_of_order_sections() {
    // Export(7) followed by Type(1).
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([7, 1, 0]); // empty export section
    bytes.extend([1, 1, 0]); // empty type section, out of order
    assert_eq!(compile_contract(&bytes), Err(CompileError::SectionOrder(1)));
}

#[test]
fn rejects_duplicate_section() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([1, 1, 0]);
    bytes.extend([1, 1, 0]);
    assert_eq!(compile_contract(&bytes), Err(CompileError::SectionOrder(1)));
}

#[test]
fn custom_sections_are_skipped_and_may_repeat() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([0, 3, 0xAA, 0xBB, 0xCC]);
    bytes.extend([1, 1, 0]);
    bytes.extend([0, 1, 0xDD]);
    assert!(compile_contract(&bytes).is_ok());
}

#[test]
fn unknown_sections_are_skipped_in_order() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([4, 1, 0]); // table section, unsupported id: skipped
    assert!(compile_contract(&bytes).is_ok());
}

#[test]
fn rejects_section_with_trailing_bytes() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([1, 2, 0, 0xFF]); // type count 0, then junk inside section
    assert_eq!(compile_contract(&bytes), Err(CompileError::SectionTrailing(1)));
}

#[test]
fn rejects_globals() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.extend([6, 1, 1]); // one global declared
    assert_eq!(
        compile_contract(&bytes),
        Err(CompileError::GlobalsUnsupported)
    );
}

#[test]
fn rejects_multi_value_returns() {
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    let payload = [1, 0x60, 0, 2, I32, I32]; // () -> (i32, i32)
    bytes.push(1);
    bytes.push(payload.len() as u8);
    bytes.extend(payload);
    assert_eq!(compile_contract(&bytes), Err(CompileError::TooManyResults));
}

// ==================== Imports ====================

#[test]
fn resolves_known_import() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I32], Some(I32));
    m.import("StackAlloc", ty);
    let image = compile_contract(&m.build()).unwrap();
    assert_eq!(image.imports.len(), 1);
    assert_eq!(image.imports[0].binding, 0x18);
}

#[test]
fn rejects_unresolved_import() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    m.import("NoSuchFn", ty);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::UnresolvedImport { .. })
    ));
}

#[test]
fn rejects_import_with_wrong_signature() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I64], Some(I32)); // StackAlloc takes i32
    m.import("StackAlloc", ty);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::ImportSignature { .. })
    ));
}

#[test]
fn manager_bindings_unavailable_to_contracts() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I32], None);
    m.import("DocAddGroup", ty);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::UnresolvedImport { .. })
    ));
    assert!(compile(&m.build(), Kind::Manager).is_ok());
}

// ==================== Exports / methods ====================

#[test]
fn method_exports_map_to_numbers() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let f0 = m.func(ty, &[], &[]);
    let f1 = m.func(ty, &[], &[]);
    let f2 = m.func(ty, &[], &[]);
    m.export("Ctor", f0);
    m.export("Dtor", f1);
    m.export("Method_7", f2);
    m.export("helper", f2); // not a method, ignored

    let image = compile_contract(&m.build()).unwrap();
    assert_eq!(image.methods.len(), 3);
    assert_eq!(image.method_func(0), Some(0));
    assert_eq!(image.method_func(1), Some(1));
    assert_eq!(image.method_func(7), Some(2));
    assert_eq!(image.method_func(2), None);
}

#[test]
fn rejects_duplicate_method() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let f = m.func(ty, &[], &[]);
    m.export("Ctor", f);
    m.export("Method_0", f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::DuplicateMethod(0))
    );
}

#[test]
fn rejects_export_of_missing_function() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    m.func(ty, &[], &[]);
    m.export("Method_2", 5);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::IndexOutOfRange(5))
    ));
}

// ==================== Rewriting ====================

#[test]
fn arithmetic_module_rewrites_to_expected_image() {
    let image = compile_contract(&arithmetic_module()).unwrap();
    assert_eq!(image.funcs, vec![0]);
    // local.get rewrites pack (offset_words << 2) | type; both arguments
    // land at packed value 15 because the operand stack grows between the
    // two reads. The function ends with ret(retvals=1, locals=0, args=2).
    assert_eq!(
        image.code,
        vec![
            0x20, 0x0F, // local.get arg0
            0x20, 0x0F, // local.get arg1
            0x41, 0x02, // i32.const 2
            0x6C, // i32.mul
            0x6A, // i32.add
            0x07, 0x01, 0x00, 0x02, // ret 1 0 2
        ]
    );
}

#[test]
fn compilation_is_deterministic() {
    let bytes = arithmetic_module();
    let a = compile_contract(&bytes).unwrap();
    let b = compile_contract(&bytes).unwrap();
    assert_eq!(a.code, b.code);
    assert_eq!(a.funcs, b.funcs);
    assert_eq!(a.methods, b.methods);
}

#[test]
fn internal_calls_get_absolute_targets() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], Some(I32));
    // f0 returns f1()
    let body0 = [&[0x10][..], &uleb(1)].concat(); // call 1
    let f0 = m.func(ty, &[], &body0);
    let body1 = [&[0x41][..], &sleb(7)].concat(); // i32.const 7
    let _f1 = m.func(ty, &[], &body1);
    m.method(2, f0);

    let image = compile_contract(&m.build()).unwrap();
    // call(0x10) + 4-byte LE target patched to f1's entry.
    assert_eq!(image.code[0], 0x10);
    let target = u32::from_le_bytes(image.code[1..5].try_into().unwrap());
    assert_eq!(target, image.funcs[1]);
}

#[test]
fn imported_calls_become_call_ext() {
    let mut m = ModuleBuilder::new();
    let alloc_ty = m.ty(&[I32], Some(I32));
    let void_ty = m.ty(&[], None);
    let imp = m.import("StackAlloc", alloc_ty);
    let body = [
        &[0x41][..],
        &sleb(8), // i32.const 8
        &[0x10],
        &uleb(u64::from(imp)), // call StackAlloc
        &[0x1A],               // drop
    ]
    .concat();
    let f = m.func(void_ty, &[], &body);
    m.method(2, f);

    let image = compile_contract(&m.build()).unwrap();
    // i32.const 8, then call_ext 0x18, then drop with its type byte.
    assert_eq!(
        &image.code[..6],
        &[0x41, 0x08, 0x08, 0x18, 0x1A, I32]
    );
}

#[test]
fn branch_targets_are_backpatched() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let body = [
        &[0x03, 0x40][..], // loop
        &[0x0C],
        &uleb(0), // br 0
        &[0x0B],  // end
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);

    let image = compile_contract(&m.build()).unwrap();
    // The loop label points at the loop head (function entry here), so the
    // branch target is pc 0.
    assert_eq!(image.code[0], 0x0C);
    assert_eq!(&image.code[1..5], &[0, 0, 0, 0]);
}

// ==================== Validation ====================

#[test]
fn rejects_float_opcodes() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    // f32.const 0 (4-byte immediate never reached).
    let f = m.func(ty, &[], &[0x43, 0, 0, 0, 0]);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::FloatOpcode(0x43))
    );
}

#[test]
fn accepts_float_types_in_signatures() {
    let mut m = ModuleBuilder::new();
    // Float-typed argument, never touched by code.
    let ty = m.ty(&[F64], None);
    let f = m.func(ty, &[], &[]);
    m.method(2, f);
    assert!(compile_contract(&m.build()).is_ok());
}

#[test]
fn rejects_unknown_opcode() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let f = m.func(ty, &[], &[0xC0]); // sign-extension extension, unsupported
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::UnknownOpcode(0xC0))
    );
}

#[test]
fn rejects_select_with_mismatched_types() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I32, I64], Some(I32));
    let body = [
        &[0x20][..],
        &uleb(1), // local.get 1 (i64)
        &[0x20],
        &uleb(0), // local.get 0 (i32)
        &[0x41],
        &sleb(1), // i32.const 1 (condition)
        &[0x1B],  // select over (i64, i32): mismatch
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::TypeMismatch { mnemonic: "select" })
    ));
}

#[test]
fn rejects_operand_type_mismatch() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I64], Some(I32));
    let body = [
        &[0x20][..],
        &uleb(0), // local.get 0 (i64)
        &[0x41],
        &sleb(1), // i32.const 1
        &[0x6A],  // i32.add over (i64, i32)
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    assert!(matches!(
        compile_contract(&m.build()),
        Err(CompileError::TypeMismatch { .. })
    ));
}

#[test]
fn rejects_branch_depth_out_of_scope() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let body = [
        &[0x02, 0x40][..], // block
        &[0x0C],
        &uleb(1), // br 1: would target the function block
        &[0x0B],
    ]
    .concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::BadBranchDepth(1))
    );
}

#[test]
fn rejects_unbalanced_blocks() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    // A block is opened and never closed; the auto-appended function `end`
    // closes the block, leaving the function block open.
    let f = m.func(ty, &[], &[0x02, 0x40]);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::UnbalancedBlocks)
    );
}

#[test]
fn rejects_missing_function_result() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], Some(I32));
    let f = m.func(ty, &[], &[]); // empty body, no value produced
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::StackImbalance)
    );
}

#[test]
fn rejects_leftover_operands() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let body = [&[0x41][..], &sleb(1)].concat(); // i32.const 1, never consumed
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::StackImbalance)
    );
}

#[test]
fn rejects_bad_local_index() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let body = [&[0x20][..], &uleb(3), &[0x1A]].concat();
    let f = m.func(ty, &[], &body);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::BadLocalIndex(3))
    );
}

#[test]
fn rejects_oversized_local_frame() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    // 2048 i64 locals = 16 KiB, over the frame limit.
    let f = m.func(ty, &[(2048, I64)], &[]);
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::OversizedFrame)
    );
}

#[test]
fn rejects_proprietary_opcodes_in_source() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let f = m.func(ty, &[], &[0x07]); // the rewriter's ret
    m.method(2, f);
    assert_eq!(
        compile_contract(&m.build()),
        Err(CompileError::UnknownOpcode(0x07))
    );
}

#[test]
fn rejects_nonvoid_block_type() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[], None);
    let f = m.func(ty, &[], &[0x02, I32, 0x0B]); // block yielding i32
    m.method(2, f);
    assert_eq!(compile_contract(&m.build()), Err(CompileError::BadBlockType));
}

#[test]
fn locals_extend_the_argument_frame() {
    let mut m = ModuleBuilder::new();
    let ty = m.ty(&[I32], None);
    let body = [
        &[0x20][..],
        &uleb(0), // local.get 0 (arg)
        &[0x21],
        &uleb(1), // local.set 1 (declared local)
    ]
    .concat();
    let f = m.func(ty, &[(1, I32)], &body);
    m.method(2, f);
    assert!(compile_contract(&m.build()).is_ok());
}
