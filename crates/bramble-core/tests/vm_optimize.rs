mod common;

use std::sync::Arc;

use bramble_core::eval::Context;
use bramble_core::vm::{disassemble, optimize, Instruction, Opcode, Script};

use common::{new_context, new_runtime};

fn run(ctx: &mut Context, script: &Script) -> bramble_core::Var {
    ctx.run_script(&Arc::new(script.clone())).expect("run")
}

#[test]
fn bool_constants_fold_to_load_bool() {
    let ctx = new_context();
    let mut script = Script::new();
    let t = script.add_const(ctx.var(true)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, t));
    script.emit(Instruction::of(Opcode::Return));

    optimize(&mut script);

    assert_eq!(script.code[0].op, Opcode::LoadBool);
    assert_eq!(script.code[0].b, 1);
    // The folded constant is unreferenced and pruned.
    assert!(script.constants.is_empty());
}

#[test]
fn small_float_constants_fold_to_load_int() {
    let ctx = new_context();
    let mut script = Script::new();
    let c = script.add_const(ctx.var(3.0f64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, c));
    script.emit(Instruction::of(Opcode::Return));

    optimize(&mut script);
    assert_eq!(script.code[0].op, Opcode::LoadInt);
    assert_eq!(script.code[0].bc(), 3);
    assert!(script.constants.is_empty());
}

#[test]
fn unfoldable_constants_stay_in_the_pool() {
    let ctx = new_context();
    let mut script = Script::new();
    let frac = script.add_const(ctx.var(3.5f64)) as u8;
    let big = script.add_const(ctx.var(40000.0f64)) as u8;
    let int = script.add_const(ctx.var(3i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, frac));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, big));
    script.emit(Instruction::ab(Opcode::LoadConst, 2, int));
    script.emit(Instruction::of(Opcode::Return));

    optimize(&mut script);
    // A fractional float, a float outside i16 range, and an int constant
    // all keep their pool indirection.
    assert!(script.code[..3]
        .iter()
        .all(|inst| inst.op == Opcode::LoadConst));
    assert_eq!(script.constants.len(), 3);
}

#[test]
fn null_jump_is_removed_and_forward_spans_retarget_by_one() {
    let mut script = Script::new();
    script.emit(Instruction::wide(Opcode::Jump, 0, 3)); // 0 -> 3
    script.emit(Instruction::wide(Opcode::Jump, 0, 0)); // null
    script.emit(Instruction::ab(Opcode::LoadBool, 0, 1)); // 2
    script.emit(Instruction::of(Opcode::Return)); // 3

    optimize(&mut script);

    assert_eq!(script.code.len(), 3);
    assert_eq!(script.code[0].op, Opcode::Jump);
    assert_eq!(script.code[0].bc(), 2);
    assert_eq!(script.code[2].op, Opcode::Return);
}

#[test]
fn backward_spans_retarget_in_the_other_direction() {
    let mut script = Script::new();
    script.emit(Instruction::ab(Opcode::LoadBool, 0, 1)); // 0
    script.emit(Instruction::wide(Opcode::Jump, 0, 0)); // null
    script.emit(Instruction::wide(Opcode::CondJump, 1, -2)); // 2 -> 0

    optimize(&mut script);

    assert_eq!(script.code.len(), 2);
    assert_eq!(script.code[1].op, Opcode::CondJump);
    assert_eq!(script.code[1].bc(), -1);
}

#[test]
fn function_offsets_crossing_the_removal_retarget_too() {
    let mut script = Script::new();
    script.emit(Instruction::wide(Opcode::LoadFun, 0, 4)); // 0 -> 4
    script.emit(Instruction::wide(Opcode::Jump, 0, 0)); // null
    script.emit(Instruction::of(Opcode::Return)); // 2
    script.emit(Instruction::ab(Opcode::Mul, 0, 0)); // 3 (dead filler)
    script.emit(Instruction::of(Opcode::Return)); // 4: entry

    optimize(&mut script);

    assert_eq!(script.code.len(), 4);
    assert_eq!(script.code[0].op, Opcode::LoadFun);
    assert_eq!(script.code[0].bc(), 3);
}

#[test]
fn unused_constants_prune_with_operand_renumbering() {
    let ctx = new_context();
    let mut script = Script::new();
    let _unused = script.add_const(ctx.var(1i64));
    let folded = script.add_const(ctx.var(true)) as u8;
    let kept = script.add_const(ctx.var(2i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, folded));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, kept));
    script.emit(Instruction::of(Opcode::Return));

    optimize(&mut script);

    assert_eq!(script.code[0].op, Opcode::LoadBool);
    assert_eq!(script.code[1].op, Opcode::LoadConst);
    // Index 2 renumbers to 0 after the two dead entries are dropped.
    assert_eq!(script.code[1].b, 0);
    assert_eq!(script.constants.len(), 1);
    assert_eq!(script.constants[0].get::<i64>(), 2);
}

fn loop_script_with_null_jump(ctx: &Context) -> Script {
    let mut script = Script::new();
    let zero = script.add_const(ctx.var(0i64)) as u8;
    let limit = script.add_const(ctx.var(3i64)) as u8;
    let one = script.add_const(ctx.var(1i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, zero)); // 0: sum
    script.emit(Instruction::ab(Opcode::LoadConst, 1, zero)); // 1: i
    script.emit(Instruction::ab(Opcode::LoadConst, 2, limit)); // 2
    script.emit(Instruction::ab(Opcode::LoadConst, 3, one)); // 3
    script.emit(Instruction::abc(Opcode::LessThan, 4, 1, 2)); // 4
    script.emit(Instruction::wide(Opcode::CondNotJump, 4, 5)); // 5 -> 10
    script.emit(Instruction::wide(Opcode::Jump, 0, 0)); // 6: null
    script.emit(Instruction::ab(Opcode::Add, 1, 3)); // 7
    script.emit(Instruction::ab(Opcode::Add, 0, 1)); // 8
    script.emit(Instruction::wide(Opcode::Jump, 0, -5)); // 9 -> 4
    script.emit(Instruction::of(Opcode::Return)); // 10
    script
}

fn call_script_with_null_jump(ctx: &Context) -> Script {
    let mut script = Script::new();
    let seven = script.add_const(ctx.var(7i64)) as u8;
    script.emit(Instruction::wide(Opcode::LoadFun, 0, 5)); // 0 -> 5
    script.emit(Instruction::ab(Opcode::LoadConst, 1, seven)); // 1
    script.emit(Instruction::wide(Opcode::Jump, 0, 0)); // 2: null
    script.emit(Instruction::ab(Opcode::Call, 0, 1)); // 3
    script.emit(Instruction::of(Opcode::Return)); // 4
    script.emit(Instruction::ab(Opcode::Mul, 0, 0)); // 5: entry
    script.emit(Instruction::of(Opcode::Return)); // 6
    script
}

fn branch_script_with_folding(ctx: &Context) -> Script {
    let mut script = Script::new();
    let cond = script.add_const(ctx.var(true)) as u8;
    let a = script.add_const(ctx.var(2.0f64)) as u8;
    let b = script.add_const(ctx.var(0.5f64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, cond)); // 0
    script.emit(Instruction::wide(Opcode::CondNotJump, 0, 3)); // 1 -> 4
    script.emit(Instruction::ab(Opcode::LoadConst, 0, a)); // 2
    script.emit(Instruction::wide(Opcode::Jump, 0, 2)); // 3 -> 5
    script.emit(Instruction::ab(Opcode::LoadConst, 0, b)); // 4
    script.emit(Instruction::of(Opcode::Return)); // 5
    script
}

/// The defining optimizer contract: optimized and unoptimized bytecode
/// behave identically on the same inputs.
#[test]
fn optimization_preserves_observable_behavior() {
    let rt = new_runtime();
    let mut ctx = Context::new(rt);
    let corpus = [
        loop_script_with_null_jump(&ctx),
        call_script_with_null_jump(&ctx),
        branch_script_with_folding(&ctx),
    ];
    for original in corpus {
        let mut optimized = original.clone();
        optimize(&mut optimized);
        let plain = run(&mut ctx, &original);
        let fast = run(&mut ctx, &optimized);
        assert_eq!(
            plain.text(),
            fast.text(),
            "optimized run diverged:\n{}",
            disassemble(&optimized, ctx.runtime().symbols())
        );
    }
}

#[test]
fn optimization_is_idempotent() {
    let ctx = new_context();
    let mut script = loop_script_with_null_jump(&ctx);
    optimize(&mut script);
    let once = script.clone();
    optimize(&mut script);
    assert_eq!(script.code, once.code);
    assert_eq!(script.constants.len(), once.constants.len());
}

#[test]
fn disassembly_renders_mnemonics_and_operands() {
    let rt = new_runtime();
    rt.register_global("score", rt.var(0i64));
    let ctx = Context::new(rt.clone());

    let mut script = Script::new();
    let c = script.add_const(ctx.var(42i64)) as u8;
    let slot = script.add_global(rt.intern("score")) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, c));
    script.emit(Instruction::ab(Opcode::StoreGlobal, slot, 0));
    script.emit(Instruction::wide(Opcode::Jump, 0, -2));
    script.emit(Instruction::of(Opcode::Return));

    let listing = disassemble(&script, rt.symbols());
    assert!(listing.contains("0000 LoadConst:    0 := 42"));
    assert!(listing.contains("0001 StoreGlobal:  score := 0"));
    assert!(listing.contains("0002 Jump:         -2"));
    assert!(listing.contains("0003 Return"));
}

#[test]
fn every_opcode_has_a_mnemonic() {
    let rt = new_runtime();
    let ctx = Context::new(rt.clone());

    let mut script = Script::new();
    let c = script.add_const(ctx.var(1i64)) as u8;
    script.add_global(rt.intern("g"));
    let all = [
        Opcode::CopyLocal,
        Opcode::LoadConst,
        Opcode::LoadBool,
        Opcode::LoadInt,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::LoadFun,
        Opcode::MakeObject,
        Opcode::GetItem,
        Opcode::SetItem,
        Opcode::MakeIterator,
        Opcode::Iterate,
        Opcode::IterEndJump,
        Opcode::Jump,
        Opcode::CondJump,
        Opcode::CondNotJump,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Inv,
        Opcode::Not,
        Opcode::LessThan,
        Opcode::LessEqual,
        Opcode::Equal,
        Opcode::Call,
        Opcode::Return,
    ];
    for op in all {
        let b = if op == Opcode::LoadConst { c } else { 0 };
        script.emit(Instruction::ab(op, 0, b));
    }
    let listing = disassemble(&script, rt.symbols());
    for op in all {
        let mnemonic = format!("{:?}", op);
        assert!(
            listing.contains(&mnemonic),
            "missing {} in:\n{}",
            mnemonic,
            listing
        );
    }
}
