use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::ScriptError;
use crate::eval::Context;
use crate::value::{Callable, Table, TableIter};
use crate::var::Var;
use crate::vm::bytecode::{Opcode, Script};

/// Executes a script from its first instruction. The result is the root
/// frame's register 0.
pub fn run(ctx: &mut Context, script: &Arc<Script>) -> Result<Var, ScriptError> {
    execute_from(ctx, script, 0, &[])
}

/// Executes a bytecode function: arguments land in registers 0.., the
/// result is register 0 when the function returns.
pub(crate) fn call_function(
    ctx: &mut Context,
    script: &Arc<Script>,
    entry: usize,
    args: &[Var],
) -> Result<Var, ScriptError> {
    execute_from(ctx, script, entry, args)
}

fn ensure_slot(regs: &mut Vec<Var>, pad: &Var, index: usize) {
    while regs.len() <= index {
        regs.push(pad.clone());
    }
}

fn truthy(value: &Var) -> bool {
    value.get::<bool>()
}

fn execute_from(
    ctx: &mut Context,
    script: &Arc<Script>,
    entry: usize,
    args: &[Var],
) -> Result<Var, ScriptError> {
    let pad = ctx.default_var();
    let trace = ctx.runtime().options().vm_trace;
    let mut regs: Vec<Var> = args.to_vec();
    let mut ip = entry;

    macro_rules! read {
        ($index:expr) => {{
            let index = $index as usize;
            regs.get(index).cloned().unwrap_or_else(|| pad.clone())
        }};
    }
    macro_rules! write {
        ($index:expr, $value:expr) => {{
            let index = $index as usize;
            ensure_slot(&mut regs, &pad, index);
            regs[index] = $value;
        }};
    }

    while ip < script.code.len() {
        let inst = script.code[ip];
        if trace {
            eprintln!("vm {:04} {:?}", ip, inst.op);
        }
        let mut next_ip = ip + 1;
        match inst.op {
            Opcode::CopyLocal => {
                let value = read!(inst.b);
                write!(inst.a, value);
            }
            Opcode::LoadConst => {
                let value = script.constants[inst.b as usize].clone();
                write!(inst.a, value);
            }
            Opcode::LoadBool => {
                let value = ctx.var(inst.b != 0);
                write!(inst.a, value);
            }
            Opcode::LoadInt => {
                // Inline encoding of a small float constant.
                let value = ctx.var(f64::from(inst.bc()));
                write!(inst.a, value);
            }
            Opcode::LoadGlobal => {
                let sym = script.globals[inst.b as usize];
                let value = ctx
                    .runtime()
                    .global(sym)
                    .unwrap_or_else(|| pad.clone());
                write!(inst.a, value);
            }
            Opcode::StoreGlobal => {
                let sym = script.globals[inst.a as usize];
                let value = read!(inst.b);
                ctx.runtime().set_global(sym, value);
            }
            Opcode::LoadFun => {
                let target = (ip as isize + inst.bc() as isize).max(0) as usize;
                let callable = Callable::Bytecode {
                    script: script.clone(),
                    entry: target,
                };
                let value = ctx.var(callable);
                write!(inst.a, value);
            }
            Opcode::MakeObject => {
                let value = ctx.var(Table::new());
                write!(inst.a, value);
            }
            Opcode::GetItem => {
                let container = read!(inst.a);
                let key = read!(inst.b);
                let found = if container.is::<Table>() {
                    let table = unsafe { container.as_ref_unchecked::<Table>() };
                    table.get(&key)
                } else {
                    None
                };
                write!(inst.c, found.unwrap_or_else(|| pad.clone()));
            }
            Opcode::SetItem => {
                let container = read!(inst.a);
                if container.is::<Table>() {
                    let table = unsafe { container.as_ref_unchecked::<Table>() };
                    table.insert(read!(inst.b), read!(inst.c));
                }
            }
            Opcode::MakeIterator => {
                let container = read!(inst.b);
                let iter = if container.is::<Table>() {
                    let table = unsafe { container.as_ref_unchecked::<Table>() };
                    TableIter::from_table(table)
                } else {
                    TableIter::default()
                };
                let value = ctx.var(iter);
                write!(inst.a, value);
            }
            Opcode::Iterate => {
                let index = inst.c as usize;
                let pair = match regs.get_mut(index) {
                    Some(slot) if slot.is::<TableIter>() => {
                        unsafe { slot.as_mut_unchecked::<TableIter>() }.next_pair()
                    }
                    _ => None,
                };
                if let Some((key, value)) = pair {
                    write!(inst.a, key);
                    write!(inst.b, value);
                }
            }
            Opcode::IterEndJump => {
                let slot = read!(inst.a);
                let ended = if slot.is::<TableIter>() {
                    unsafe { slot.as_ref_unchecked::<TableIter>() }.at_end()
                } else {
                    true
                };
                if ended && inst.bc() != 0 {
                    next_ip = (ip as isize + inst.bc() as isize).max(0) as usize;
                }
            }
            Opcode::Jump => {
                // Offset zero is a defined no-op.
                if inst.bc() != 0 {
                    next_ip = (ip as isize + inst.bc() as isize).max(0) as usize;
                }
            }
            Opcode::CondJump => {
                if truthy(&read!(inst.a)) && inst.bc() != 0 {
                    next_ip = (ip as isize + inst.bc() as isize).max(0) as usize;
                }
            }
            Opcode::CondNotJump => {
                if !truthy(&read!(inst.a)) && inst.bc() != 0 {
                    next_ip = (ip as isize + inst.bc() as isize).max(0) as usize;
                }
            }
            Opcode::Add => {
                let rhs = read!(inst.b);
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].add_assign_var(&rhs);
            }
            Opcode::Sub => {
                let rhs = read!(inst.b);
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].sub_assign_var(&rhs);
            }
            Opcode::Mul => {
                let rhs = read!(inst.b);
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].mul_assign_var(&rhs);
            }
            Opcode::Div => {
                let rhs = read!(inst.b);
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].div_assign_var(&rhs);
            }
            Opcode::Mod => {
                let rhs = read!(inst.b);
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].rem_assign_var(&rhs);
            }
            Opcode::Inv => {
                ensure_slot(&mut regs, &pad, inst.a as usize);
                regs[inst.a as usize].negate();
            }
            Opcode::Not => {
                let value = ctx.var(!truthy(&read!(inst.a)));
                write!(inst.a, value);
            }
            Opcode::LessThan => {
                let ordering = read!(inst.b).compare(&read!(inst.c));
                let value = ctx.var(ordering == Some(Ordering::Less));
                write!(inst.a, value);
            }
            Opcode::LessEqual => {
                let ordering = read!(inst.b).compare(&read!(inst.c));
                let value = ctx.var(matches!(
                    ordering,
                    Some(Ordering::Less) | Some(Ordering::Equal)
                ));
                write!(inst.a, value);
            }
            Opcode::Equal => {
                let equal = read!(inst.b).semantic_eq(&read!(inst.c));
                let value = ctx.var(equal);
                write!(inst.a, value);
            }
            Opcode::Call => {
                let callee = read!(inst.a);
                if callee.is::<Callable>() {
                    let callable = unsafe { callee.as_ref_unchecked::<Callable>() }.clone();
                    let argc = inst.b as usize;
                    let call_args: Vec<Var> = (0..argc)
                        .map(|i| read!(inst.a as usize + 1 + i))
                        .collect();
                    let result = ctx.call_with_args(&callable, &call_args)?;
                    write!(inst.a, result);
                }
            }
            Opcode::Return => break,
        }
        ip = next_ip;
    }

    Ok(regs.into_iter().next().unwrap_or(pad))
}
