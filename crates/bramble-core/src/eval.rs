use std::sync::Arc;

use crate::error::ScriptError;
use crate::options::LookupPolicy;
use crate::reader::Reader;
use crate::runtime::ScriptRuntime;
use crate::symbols::Symbol;
use crate::value::{Callable, List, Quote, Table};
use crate::var::Var;
use crate::vm;

pub struct Binding {
    pub symbol: Symbol,
    pub value: Var,
}

/// Tree-walking interpreter state: one growable binding stack sliced into
/// lexical frames by a parallel boundary stack, plus the current self
/// receiver. Single-threaded; runs each call to completion.
pub struct Context {
    runtime: Arc<ScriptRuntime>,
    stack: Vec<Binding>,
    frames: Vec<u32>,
    selves: Vec<Var>,
}

impl Context {
    pub fn new(runtime: Arc<ScriptRuntime>) -> Self {
        Self {
            runtime,
            stack: Vec::new(),
            // Current frame start, next frame start.
            frames: vec![0, 0],
            selves: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<ScriptRuntime> {
        &self.runtime
    }

    pub fn var<T: 'static>(&self, value: T) -> Var {
        self.runtime.types().var(value)
    }

    pub fn default_var(&self) -> Var {
        self.runtime.default_var()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.runtime.intern(name)
    }

    fn current_frame(&self) -> u32 {
        assert!(self.frames.len() >= 2, "frame underflow");
        self.frames[self.frames.len() - 2]
    }

    fn next_frame(&self) -> u32 {
        *self.frames.last().expect("frame underflow")
    }

    pub fn local_count(&self) -> usize {
        (self.next_frame() - self.current_frame()) as usize
    }

    /// Binding value at position `i` of the current frame.
    pub fn param(&self, i: usize) -> &Var {
        let index = self.current_frame() as usize + i;
        assert!(
            index < self.next_frame() as usize,
            "parameter index out of frame"
        );
        &self.stack[index].value
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    fn push_binding(&mut self, symbol: Symbol, value: Var) {
        self.stack.push(Binding { symbol, value });
        *self.frames.last_mut().expect("frame underflow") += 1;
    }

    fn push_frame(&mut self) {
        let next = self.next_frame();
        self.frames.push(next);
    }

    fn pop_frame(&mut self) {
        assert!(self.frames.len() > 2, "frame underflow");
        self.frames.pop();
        let keep = self.next_frame() as usize;
        self.stack.truncate(keep);
    }

    /// Resolve a symbol: scan the binding stack top-down across all active
    /// frames, then the global table. A miss follows the configured
    /// lookup policy.
    pub fn lookup(&mut self, sym: Symbol) -> Result<Var, ScriptError> {
        let top = self.next_frame() as usize;
        for binding in self.stack[..top].iter().rev() {
            if binding.symbol == sym {
                return Ok(binding.value.clone());
            }
        }
        if let Some(value) = self.runtime.global(sym) {
            return Ok(value);
        }
        match self.runtime.options().lookup_policy {
            LookupPolicy::AutoBind => {
                let value = self.default_var();
                self.push_binding(sym, value.clone());
                Ok(value)
            }
            LookupPolicy::Strict => Err(ScriptError::unbound_symbol(
                self.runtime.symbols().describe(sym),
            )),
        }
    }

    /// Assign into the innermost existing binding, else an existing
    /// global, else a new binding in the current scope.
    pub fn assign(&mut self, sym: Symbol, value: Var) -> Var {
        let top = self.next_frame() as usize;
        for binding in self.stack[..top].iter_mut().rev() {
            if binding.symbol == sym {
                binding.value = value.clone();
                return value;
            }
        }
        if self.runtime.has_global(sym) {
            self.runtime.set_global(sym, value.clone());
            return value;
        }
        self.push_binding(sym, value.clone());
        value
    }

    pub fn execute(&mut self, code: &Var) -> Result<Var, ScriptError> {
        if code.is::<List>() {
            let items = unsafe { code.as_ref_unchecked::<List>() }.0.clone();
            if items.is_empty() {
                return Ok(code.clone());
            }
            let head = self.execute(&items[0])?;
            if head.is::<Callable>() {
                let callable = unsafe { head.as_ref_unchecked::<Callable>() }.clone();
                return self.invoke(&callable, &items);
            }
            if head.is::<List>() {
                // A plain list in call position acts as (params body).
                let list = unsafe { head.as_ref_unchecked::<List>() };
                let callable = Callable::Lambda {
                    params: list.0.first().cloned().unwrap_or_default(),
                    body: list.0.get(1).cloned().unwrap_or_default(),
                };
                return self.invoke(&callable, &items);
            }
            // Head is not callable: the expression stands for itself.
            return Ok(code.clone());
        }
        if code.is::<Symbol>() {
            let sym = unsafe { *code.as_ref_unchecked::<Symbol>() };
            return self.lookup(sym);
        }
        if code.is::<Quote>() {
            let quote = unsafe { code.as_ref_unchecked::<Quote>() };
            return Ok(quote.0.clone());
        }
        Ok(code.clone())
    }

    fn invoke(&mut self, callable: &Callable, expr: &[Var]) -> Result<Var, ScriptError> {
        if let Callable::Native(f) = callable {
            return f(self, expr);
        }
        let mut args = Vec::with_capacity(expr.len().saturating_sub(1));
        for arg in &expr[1..] {
            args.push(self.execute(arg)?);
        }
        self.call_with_args(callable, &args)
    }

    /// The one dispatch site for every evaluated-argument callable kind:
    /// arguments become a fresh frame, bound to declared parameter symbols
    /// where the callee names one for the position, anonymous otherwise.
    pub fn call_with_args(&mut self, callable: &Callable, args: &[Var]) -> Result<Var, ScriptError> {
        let mut param_syms = vec![Symbol::ANONYMOUS; args.len()];
        if let Callable::Lambda { params, .. } = callable {
            if params.is::<List>() {
                let specs = unsafe { params.as_ref_unchecked::<List>() }.0.clone();
                for (i, slot) in param_syms.iter_mut().enumerate() {
                    if let Some(spec) = specs.get(i) {
                        let named = self.execute(spec)?;
                        if named.is::<Symbol>() {
                            *slot = unsafe { *named.as_ref_unchecked::<Symbol>() };
                        }
                    }
                }
            }
        }
        self.push_frame();
        for (sym, value) in param_syms.iter().zip(args) {
            self.push_binding(*sym, value.clone());
        }
        let result = match callable {
            // A special form reached through the evaluated path has lost
            // its argument expressions; degrade.
            Callable::Native(_) => Ok(self.default_var()),
            Callable::Function(f) => (**f)(self, args),
            Callable::Lambda { body, .. } => self.execute(body),
            Callable::Bytecode { script, entry } => {
                vm::run::call_function(self, script, *entry, args)
            }
        };
        self.pop_frame();
        result
    }

    pub fn push_self(&mut self, receiver: Var) {
        self.selves.push(receiver);
    }

    pub fn pop_self(&mut self) -> Option<Var> {
        self.selves.pop()
    }

    pub fn current_self(&self) -> Option<&Var> {
        self.selves.last()
    }

    /// The current self receiver as a table, when it is one.
    pub fn self_table(&self) -> Option<Table> {
        let receiver = self.selves.last()?;
        if receiver.is::<Table>() {
            Some(unsafe { receiver.as_ref_unchecked::<Table>() }.clone())
        } else {
            None
        }
    }

    /// Host lifecycle entry point: look `name` up in the self table and,
    /// when it holds a callable, execute it with `self` bound. Returns
    /// whether a method ran.
    pub fn try_execute_method(&mut self, name: Symbol, args: &[Var]) -> Result<bool, ScriptError> {
        let Some(table) = self.self_table() else {
            return Ok(false);
        };
        let key = self.var(name);
        let Some(found) = table.get(&key) else {
            return Ok(false);
        };
        if !found.is::<Callable>() {
            return Ok(false);
        }
        let callable = unsafe { found.as_ref_unchecked::<Callable>() }.clone();
        let receiver = self.selves.last().cloned().expect("self receiver");
        let self_sym = self.intern("self");
        self.push_frame();
        self.push_binding(self_sym, receiver);
        let result = self.call_with_args(&callable, args);
        self.pop_frame();
        result.map(|_| true)
    }

    /// Host read loop: parse one top-level expression at a time and
    /// execute it; the last result wins.
    pub fn eval_source(&mut self, source: &str) -> Result<Var, ScriptError> {
        let mut reader = Reader::new(source);
        let mut last = self.default_var();
        while let Some(expr) = reader.read_next(self)? {
            last = self.execute(&expr)?;
        }
        Ok(last)
    }

    /// Executes a compiled script from its first instruction.
    pub fn run_script(&mut self, script: &Arc<vm::bytecode::Script>) -> Result<Var, ScriptError> {
        vm::run::run(self, script)
    }
}
