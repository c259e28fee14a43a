use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use crate::error::ScriptError;
use crate::eval::Context;
use crate::symbols::{Symbol, SymbolTable};
use crate::types::TypeRegistry;
use crate::var::Var;
use crate::vm::bytecode::Script;

/// An ordered sequence of Vars: a call when evaluated, a list otherwise.
#[derive(Clone, Default)]
pub struct List(pub Vec<Var>);

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", item)?;
        }
        f.write_str(")")
    }
}

/// Marks the wrapped expression as literal data, exempt from evaluation.
#[derive(Clone, Default)]
pub struct Quote(pub Var);

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

/// Special form: receives the raw call expression (head included) and
/// controls its own evaluation order.
pub type NativeFn = fn(&mut Context, &[Var]) -> Result<Var, ScriptError>;

/// Host callable over pre-evaluated arguments.
pub type HostFn = Arc<dyn Fn(&mut Context, &[Var]) -> Result<Var, ScriptError> + Send + Sync>;

fn uncallable(ctx: &mut Context, _expr: &[Var]) -> Result<Var, ScriptError> {
    Ok(ctx.default_var())
}

/// Every callable kind behind one tag, dispatched through a single call
/// site taking (interpreter state, argument slice).
#[derive(Clone)]
pub enum Callable {
    Native(NativeFn),
    Function(HostFn),
    Lambda { params: Var, body: Var },
    Bytecode { script: Arc<Script>, entry: usize },
}

impl Default for Callable {
    fn default() -> Self {
        Callable::Native(uncallable)
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => f.write_str("#<native>"),
            Callable::Function(_) => f.write_str("#<fn>"),
            Callable::Lambda { .. } => f.write_str("#<lambda>"),
            Callable::Bytecode { entry, .. } => write!(f, "#<script@{}>", entry),
        }
    }
}

/// Shared ordered mapping, the attribute store behind method-style self
/// access. Cloning shares the underlying table.
#[derive(Clone, Default)]
pub struct Table(Arc<RwLock<BTreeMap<Var, Var>>>);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Var) -> Option<Var> {
        self.0.read().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: Var, value: Var) {
        self.0.write().unwrap().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().unwrap().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(Var, Var)> {
        self.0
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.snapshot().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        f.write_str("}")
    }
}

/// A value that other values assign through.
#[derive(Clone, Default)]
pub struct VarRef(Arc<RwLock<Var>>);

impl VarRef {
    pub fn new(value: Var) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn get(&self) -> Var {
        self.0.read().unwrap().clone()
    }

    pub fn set(&self, value: Var) {
        *self.0.write().unwrap() = value;
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<ref {}>", self.get())
    }
}

/// Iteration state over a table snapshot; order is the table's key order,
/// stable for the iterator's lifetime.
#[derive(Clone, Default)]
pub struct TableIter {
    items: Arc<Vec<(Var, Var)>>,
    pos: usize,
}

impl TableIter {
    pub fn from_table(table: &Table) -> Self {
        Self {
            items: Arc::new(table.snapshot()),
            pos: 0,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.items.len()
    }

    pub fn next_pair(&mut self) -> Option<(Var, Var)> {
        let pair = self.items.get(self.pos).cloned();
        if pair.is_some() {
            self.pos += 1;
        }
        pair
    }
}

impl fmt::Display for TableIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<iterator {}/{}>", self.pos, self.items.len())
    }
}

unsafe fn float_hash(p: *const u8) -> u32 {
    let bits = (*p.cast::<f64>()).to_bits();
    (bits ^ (bits >> 32)) as u32
}

unsafe fn float_text(p: *const u8, out: &mut String) {
    // {:?} keeps the decimal point, so the reader classifies it back as a
    // float.
    let _ = write!(out, "{:?}", *p.cast::<f64>());
}

unsafe fn string_text(p: *const u8, out: &mut String) {
    write_quoted(&*p.cast::<String>(), out);
}

pub(crate) fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
}

unsafe fn concat_string(a: *mut u8, b: *const u8) {
    (*a.cast::<String>()).push_str(&*b.cast::<String>());
}

unsafe fn div_int(a: *mut u8, b: *const u8) {
    let rhs = *b.cast::<i64>();
    if rhs != 0 {
        *a.cast::<i64>() /= rhs;
    }
}

unsafe fn rem_int(a: *mut u8, b: *const u8) {
    let rhs = *b.cast::<i64>();
    if rhs != 0 {
        *a.cast::<i64>() %= rhs;
    }
}

/// Registers the built-in type set and the cast graph. Runs once per
/// registry, before any evaluation.
pub(crate) fn install_primitives(types: &TypeRegistry) {
    types
        .register::<bool>("bool")
        .can_cmp()
        .can_hash()
        .can_serde()
        .finish();
    types
        .register::<i64>("int")
        .can_math()
        .can_rem()
        .with_div_op(div_int)
        .with_rem_op(rem_int)
        .can_cmp()
        .can_hash()
        .can_serde()
        .finish();
    types
        .register::<f64>("float")
        .can_math()
        .can_rem()
        .can_cmp()
        .with_hash_op(float_hash)
        .with_text_op(float_text)
        .can_serde()
        .finish();
    types
        .register::<String>("string")
        .with_add_op(concat_string)
        .can_cmp()
        .can_hash()
        .can_serde()
        .with_text_op(string_text)
        .finish();
    types
        .register::<Symbol>("symbol")
        .can_cmp()
        .can_hash()
        .finish();
    types.register::<List>("list").finish();
    types.register::<Quote>("quote").finish();
    types.register::<Callable>("callable").finish();
    types.register::<Table>("table").finish();
    types.register::<VarRef>("ref").finish();
    types.register::<TableIter>("iterator").finish();

    types.declare_cast::<i64, bool>(|n| *n != 0);
    types.declare_cast::<i64, f64>(|n| *n as f64);
    types.declare_cast::<i64, String>(|n| n.to_string());
    types.declare_cast::<f64, String>(|f| f.to_string());
    types.declare_cast::<String, bool>(|s| !s.is_empty());
}

/// Renders an expression tree back to source form, resolving symbol names
/// through the table. Scalars use their literal text form, so formatting
/// a parsed program yields a program that reads back equal.
pub fn format_code(var: &Var, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    write_code(var, symbols, &mut out);
    out
}

fn write_code(var: &Var, symbols: &SymbolTable, out: &mut String) {
    if var.is::<List>() {
        let list = unsafe { var.as_ref_unchecked::<List>() };
        out.push('(');
        for (i, item) in list.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write_code(item, symbols, out);
        }
        out.push(')');
    } else if var.is::<Quote>() {
        let quote = unsafe { var.as_ref_unchecked::<Quote>() };
        out.push('\'');
        write_code(&quote.0, symbols, out);
    } else if var.is::<Symbol>() {
        let sym = unsafe { *var.as_ref_unchecked::<Symbol>() };
        out.push_str(&symbols.describe(sym));
    } else {
        out.push_str(&var.text());
    }
}
