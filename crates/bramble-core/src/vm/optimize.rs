use crate::vm::bytecode::{Opcode, Script};

/// Three ordered, semantics-preserving passes. Executing the optimized
/// script must be observably identical to executing the input; that
/// contract is carried by the test corpus, not by runtime checks here.
pub fn optimize(script: &mut Script) {
    fold_constant_shortcuts(script);
    remove_null_jumps(script);
    prune_unused_constants(script);
}

/// Rewrites `LoadConst` into the direct-encoded `LoadBool`/`LoadInt`
/// shortcuts when the constant is a boolean, or a float exactly equal to
/// its 16-bit integer truncation. The pool entry is left behind for pass 3
/// to collect.
fn fold_constant_shortcuts(script: &mut Script) {
    for inst in &mut script.code {
        if inst.op != Opcode::LoadConst {
            continue;
        }
        let Some(constant) = script.constants.get(inst.b as usize) else {
            continue;
        };
        if constant.is::<bool>() {
            let value = constant.get::<bool>();
            inst.op = Opcode::LoadBool;
            inst.b = u8::from(value);
            inst.c = 0;
        } else if constant.is::<f64>() {
            let value = constant.get::<f64>();
            if value == f64::from(value as i16) {
                inst.op = Opcode::LoadInt;
                inst.set_bc(value as i16);
            }
        }
    }
}

/// Removes jumps whose offset is exactly zero (defined no-ops). Each round
/// computes one remap table (old index -> new index) and applies it
/// uniformly to every index-bearing operand: all jump kinds and the
/// function-offset of `LoadFun`. Removal can collapse another jump's span
/// to zero, so rounds repeat until none is left.
fn remove_null_jumps(script: &mut Script) {
    loop {
        let doomed: Vec<bool> = script
            .code
            .iter()
            .map(|inst| inst.is_jump() && inst.bc() == 0)
            .collect();
        if !doomed.contains(&true) {
            break;
        }

        // remap[i] = index instruction i (or, for a removed one, its
        // successor) occupies after the removal.
        let mut remap = Vec::with_capacity(script.code.len() + 1);
        let mut next = 0usize;
        for gone in &doomed {
            remap.push(next);
            if !*gone {
                next += 1;
            }
        }
        remap.push(next);

        let len = script.code.len();
        let mut out = Vec::with_capacity(next);
        for (index, inst) in script.code.iter().enumerate() {
            if doomed[index] {
                continue;
            }
            let mut inst = *inst;
            if inst.is_jump() || inst.op == Opcode::LoadFun {
                let target = (index as isize + inst.bc() as isize).clamp(0, len as isize) as usize;
                let new_target = remap[target] as isize;
                let new_index = remap[index] as isize;
                inst.set_bc((new_target - new_index) as i16);
            }
            out.push(inst);
        }
        script.code = out;
    }
}

/// Drops constant-pool entries no surviving `LoadConst` references, via
/// one remap table applied to every `LoadConst` operand.
fn prune_unused_constants(script: &mut Script) {
    let mut used = vec![false; script.constants.len()];
    for inst in &script.code {
        if inst.op == Opcode::LoadConst {
            if let Some(slot) = used.get_mut(inst.b as usize) {
                *slot = true;
            }
        }
    }
    if used.iter().all(|keep| *keep) {
        return;
    }

    let mut remap = vec![0usize; script.constants.len()];
    let mut next = 0usize;
    for (index, keep) in used.iter().enumerate() {
        remap[index] = next;
        if *keep {
            next += 1;
        }
    }

    let mut kept = Vec::with_capacity(next);
    for (index, constant) in script.constants.drain(..).enumerate() {
        if used[index] {
            kept.push(constant);
        }
    }
    script.constants = kept;

    for inst in &mut script.code {
        if inst.op == Opcode::LoadConst {
            inst.b = remap[inst.b as usize] as u8;
        }
    }
}
