use std::fmt::Write as _;

use crate::symbols::SymbolTable;
use crate::vm::bytecode::{Opcode, Script};

/// Human-readable listing, the only externally observable bytecode
/// surface: address, mnemonic, operands; constants render through their
/// descriptors and global slots through the symbol table.
pub fn disassemble(script: &Script, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    for (addr, inst) in script.code.iter().enumerate() {
        let _ = write!(out, "{:04} ", addr);
        let line = match inst.op {
            Opcode::CopyLocal => format!("CopyLocal:    {} := {}", inst.a, inst.b),
            Opcode::LoadConst => match script.constants.get(inst.b as usize) {
                Some(constant) => format!("LoadConst:    {} := {}", inst.a, constant),
                None => format!("LoadConst:    {} := <bad const {}>", inst.a, inst.b),
            },
            Opcode::LoadBool => format!("LoadBool:     {} := {}", inst.a, inst.b != 0),
            Opcode::LoadInt => format!("LoadInt:      {} := {}", inst.a, inst.bc()),
            Opcode::LoadGlobal => format!(
                "LoadGlobal:   {} := {}",
                inst.a,
                global_name(script, symbols, inst.b)
            ),
            Opcode::StoreGlobal => format!(
                "StoreGlobal:  {} := {}",
                global_name(script, symbols, inst.a),
                inst.b
            ),
            Opcode::LoadFun => format!("LoadFun:      {} := {}", inst.a, inst.bc()),
            Opcode::MakeObject => format!("MakeObject:   {} := {{}}", inst.a),
            Opcode::GetItem => format!("GetItem:      {} := {}[{}]", inst.c, inst.a, inst.b),
            Opcode::SetItem => format!("SetItem:      {}[{}] := {}", inst.a, inst.b, inst.c),
            Opcode::MakeIterator => format!("MakeIterator: {} := it({})", inst.a, inst.b),
            Opcode::Iterate => format!("Iterate:      ({},{}) := iter({})", inst.a, inst.b, inst.c),
            Opcode::IterEndJump => format!("IterEndJump:  iter_end({}) => {}", inst.a, inst.bc()),
            Opcode::Jump => format!("Jump:         {}", inst.bc()),
            Opcode::CondJump => format!("CondJump:     {} => {}", inst.a, inst.bc()),
            Opcode::CondNotJump => format!("CondNotJump:  !{} => {}", inst.a, inst.bc()),
            Opcode::Add => format!("Add:          {} += {}", inst.a, inst.b),
            Opcode::Sub => format!("Sub:          {} -= {}", inst.a, inst.b),
            Opcode::Mul => format!("Mul:          {} *= {}", inst.a, inst.b),
            Opcode::Div => format!("Div:          {} /= {}", inst.a, inst.b),
            Opcode::Mod => format!("Mod:          {} %= {}", inst.a, inst.b),
            Opcode::Inv => format!("Inv:          {} := inv({})", inst.a, inst.a),
            Opcode::Not => format!("Not:          {} := !{}", inst.a, inst.a),
            Opcode::LessThan => {
                format!("LessThan:     {} := {} < {}", inst.a, inst.b, inst.c)
            }
            Opcode::LessEqual => {
                format!("LessEqual:    {} := {} <= {}", inst.a, inst.b, inst.c)
            }
            Opcode::Equal => format!("Equal:        {} := {} == {}", inst.a, inst.b, inst.c),
            Opcode::Call => format!("Call:         {} ({} parameters)", inst.a, inst.b),
            Opcode::Return => "Return".to_string(),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn global_name(script: &Script, symbols: &SymbolTable, slot: u8) -> String {
    match script.globals.get(slot as usize) {
        Some(sym) => symbols.describe(*sym),
        None => format!("<bad global {}>", slot),
    }
}
