mod common;

use std::sync::Arc;

use bramble_core::eval::Context;
use bramble_core::vm::{Instruction, Opcode, Script};

use common::{new_context, new_runtime};

fn run(ctx: &mut Context, script: Script) -> bramble_core::Var {
    ctx.run_script(&Arc::new(script)).expect("run")
}

#[test]
fn constants_load_and_add() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let two = script.add_const(ctx.var(2i64));
    let three = script.add_const(ctx.var(3i64));
    script.emit(Instruction::ab(Opcode::LoadConst, 0, two as u8));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, three as u8));
    script.emit(Instruction::ab(Opcode::Add, 0, 1));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 5);
}

#[test]
fn inline_encodings_materialize_directly() {
    let mut ctx = new_context();
    let mut script = Script::new();
    script.emit(Instruction::wide(Opcode::LoadInt, 0, 7));
    script.emit(Instruction::of(Opcode::Return));
    let result = run(&mut ctx, script);
    // LoadInt is the inline encoding of a small float constant.
    assert!(result.is::<f64>());
    assert_eq!(result.get::<f64>(), 7.0);

    let mut script = Script::new();
    script.emit(Instruction::ab(Opcode::LoadBool, 0, 1));
    script.emit(Instruction::of(Opcode::Return));
    assert!(run(&mut ctx, script).get::<bool>());
}

#[test]
fn conditional_jumps_drive_a_loop() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let zero = script.add_const(ctx.var(0i64)) as u8;
    let limit = script.add_const(ctx.var(3i64)) as u8;
    let one = script.add_const(ctx.var(1i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, zero)); // sum
    script.emit(Instruction::ab(Opcode::LoadConst, 1, zero)); // i
    script.emit(Instruction::ab(Opcode::LoadConst, 2, limit));
    script.emit(Instruction::ab(Opcode::LoadConst, 3, one));
    script.emit(Instruction::abc(Opcode::LessThan, 4, 1, 2)); // 4
    script.emit(Instruction::wide(Opcode::CondNotJump, 4, 4)); // 5 -> 9
    script.emit(Instruction::ab(Opcode::Add, 1, 3)); // i += 1
    script.emit(Instruction::ab(Opcode::Add, 0, 1)); // sum += i
    script.emit(Instruction::wide(Opcode::Jump, 0, -4)); // 8 -> 4
    script.emit(Instruction::of(Opcode::Return)); // 9
    assert_eq!(run(&mut ctx, script).get::<i64>(), 6);
}

#[test]
fn tables_store_and_fetch_by_key() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let k1 = script.add_const(ctx.var(1i64)) as u8;
    let v1 = script.add_const(ctx.var(10i64)) as u8;
    let k2 = script.add_const(ctx.var(2i64)) as u8;
    let v2 = script.add_const(ctx.var(20i64)) as u8;
    script.emit(Instruction::of(Opcode::MakeObject));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, k1));
    script.emit(Instruction::ab(Opcode::LoadConst, 2, v1));
    script.emit(Instruction::abc(Opcode::SetItem, 0, 1, 2));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, k2));
    script.emit(Instruction::ab(Opcode::LoadConst, 2, v2));
    script.emit(Instruction::abc(Opcode::SetItem, 0, 1, 2));
    script.emit(Instruction::abc(Opcode::GetItem, 0, 1, 3)); // r3 := t[2]
    script.emit(Instruction::ab(Opcode::CopyLocal, 0, 3));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 20);
}

#[test]
fn iteration_walks_a_table_snapshot() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let k1 = script.add_const(ctx.var(1i64)) as u8;
    let v1 = script.add_const(ctx.var(10i64)) as u8;
    let k2 = script.add_const(ctx.var(2i64)) as u8;
    let v2 = script.add_const(ctx.var(20i64)) as u8;
    let zero = script.add_const(ctx.var(0i64)) as u8;
    script.emit(Instruction::of(Opcode::MakeObject)); // 0: table in r0
    script.emit(Instruction::ab(Opcode::LoadConst, 1, k1));
    script.emit(Instruction::ab(Opcode::LoadConst, 2, v1));
    script.emit(Instruction::abc(Opcode::SetItem, 0, 1, 2));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, k2));
    script.emit(Instruction::ab(Opcode::LoadConst, 2, v2));
    script.emit(Instruction::abc(Opcode::SetItem, 0, 1, 2));
    script.emit(Instruction::ab(Opcode::LoadConst, 3, zero)); // 7: sum
    script.emit(Instruction::ab(Opcode::MakeIterator, 4, 0)); // 8
    script.emit(Instruction::wide(Opcode::IterEndJump, 4, 4)); // 9 -> 13
    script.emit(Instruction::abc(Opcode::Iterate, 5, 6, 4)); // 10
    script.emit(Instruction::ab(Opcode::Add, 3, 6)); // 11: sum += value
    script.emit(Instruction::wide(Opcode::Jump, 0, -3)); // 12 -> 9
    script.emit(Instruction::ab(Opcode::CopyLocal, 0, 3)); // 13
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 30);
}

#[test]
fn globals_load_and_store_through_named_slots() {
    let rt = new_runtime();
    rt.register_global("score", rt.var(5i64));
    let mut ctx = Context::new(rt.clone());

    let mut script = Script::new();
    let slot = script.add_global(rt.intern("score")) as u8;
    let delta = script.add_const(rt.var(37i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadGlobal, 0, slot));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, delta));
    script.emit(Instruction::ab(Opcode::Add, 0, 1));
    script.emit(Instruction::ab(Opcode::StoreGlobal, slot, 0));
    script.emit(Instruction::of(Opcode::Return));

    assert_eq!(run(&mut ctx, script).get::<i64>(), 42);
    let sym = rt.intern("score");
    assert_eq!(rt.global(sym).expect("global").get::<i64>(), 42);
}

#[test]
fn bytecode_functions_call_and_return() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let seven = script.add_const(ctx.var(7i64)) as u8;
    script.emit(Instruction::wide(Opcode::LoadFun, 0, 4)); // 0 -> entry 4
    script.emit(Instruction::ab(Opcode::LoadConst, 1, seven));
    script.emit(Instruction::ab(Opcode::Call, 0, 1)); // r0 := square(7)
    script.emit(Instruction::of(Opcode::Return));
    script.emit(Instruction::ab(Opcode::Mul, 0, 0)); // 4: arg *= arg
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 49);
}

#[test]
fn host_functions_are_callable_from_bytecode() {
    let rt = new_runtime();
    rt.register_function("double", |ctx, args| {
        let n = args.first().map(|a| a.get::<i64>()).unwrap_or_default();
        Ok(ctx.var(n * 2))
    });
    let mut ctx = Context::new(rt.clone());

    let mut script = Script::new();
    let slot = script.add_global(rt.intern("double")) as u8;
    let c = script.add_const(rt.var(21i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadGlobal, 0, slot));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, c));
    script.emit(Instruction::ab(Opcode::Call, 0, 1));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 42);
}

#[test]
fn unary_and_comparison_opcodes() {
    let mut ctx = new_context();

    let mut script = Script::new();
    let five = script.add_const(ctx.var(5i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, five));
    script.emit(Instruction::ab(Opcode::Inv, 0, 0));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), -5);

    let mut script = Script::new();
    script.emit(Instruction::ab(Opcode::LoadBool, 0, 0));
    script.emit(Instruction::ab(Opcode::Not, 0, 0));
    script.emit(Instruction::of(Opcode::Return));
    assert!(run(&mut ctx, script).get::<bool>());

    let mut script = Script::new();
    let two = script.add_const(ctx.var(2i64)) as u8;
    let three = script.add_const(ctx.var(3i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, two));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, three));
    script.emit(Instruction::abc(Opcode::LessThan, 2, 0, 1));
    script.emit(Instruction::ab(Opcode::CopyLocal, 0, 2));
    script.emit(Instruction::of(Opcode::Return));
    assert!(run(&mut ctx, script).get::<bool>());

    let mut script = Script::new();
    let two = script.add_const(ctx.var(2i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, two));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, two));
    script.emit(Instruction::abc(Opcode::Equal, 2, 0, 1));
    script.emit(Instruction::ab(Opcode::CopyLocal, 0, 2));
    script.emit(Instruction::of(Opcode::Return));
    assert!(run(&mut ctx, script).get::<bool>());
}

#[test]
fn mixed_type_arithmetic_casts_the_right_operand() {
    let mut ctx = new_context();
    let mut script = Script::new();
    let half = script.add_const(ctx.var(2.5f64)) as u8;
    let two = script.add_const(ctx.var(2i64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, half));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, two));
    // float += int goes through the registered int -> float cast.
    script.emit(Instruction::ab(Opcode::Add, 0, 1));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<f64>(), 4.5);

    // int += float has no cast and degrades to a no-op.
    let mut script = Script::new();
    let two = script.add_const(ctx.var(2i64)) as u8;
    let half = script.add_const(ctx.var(2.5f64)) as u8;
    script.emit(Instruction::ab(Opcode::LoadConst, 0, two));
    script.emit(Instruction::ab(Opcode::LoadConst, 1, half));
    script.emit(Instruction::ab(Opcode::Add, 0, 1));
    script.emit(Instruction::of(Opcode::Return));
    assert_eq!(run(&mut ctx, script).get::<i64>(), 2);
}
