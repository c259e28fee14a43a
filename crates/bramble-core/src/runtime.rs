use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::builtins;
use crate::error::ScriptError;
use crate::eval::Context;
use crate::options::EvalOptions;
use crate::symbols::{Symbol, SymbolTable};
use crate::types::TypeRegistry;
use crate::value::{self, Callable, NativeFn};
use crate::var::Var;

/// Root object owning the process-wide registries: symbol table, type
/// registry, and the global binding table. All registration happens during
/// initialization; execution only reads (user `set` on an existing global
/// is the one sanctioned runtime write). Constructing a fresh runtime per
/// test run yields fully isolated registries.
pub struct ScriptRuntime {
    symbols: Arc<SymbolTable>,
    types: TypeRegistry,
    globals: RwLock<HashMap<Symbol, Var>>,
    options: EvalOptions,
}

impl ScriptRuntime {
    pub fn new(options: EvalOptions) -> Arc<Self> {
        let symbols = Arc::new(SymbolTable::new());
        let types = TypeRegistry::new(symbols.clone());
        value::install_primitives(&types);
        let runtime = Arc::new(Self {
            symbols,
            types,
            globals: RwLock::new(HashMap::new()),
            options,
        });
        builtins::install(&runtime);
        runtime
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(EvalOptions::default())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn var<T: 'static>(&self, value: T) -> Var {
        self.types.var(value)
    }

    /// The degraded-result value: integer zero.
    pub fn default_var(&self) -> Var {
        self.types.var(0i64)
    }

    pub fn global(&self, sym: Symbol) -> Option<Var> {
        self.globals.read().unwrap().get(&sym).cloned()
    }

    pub fn has_global(&self, sym: Symbol) -> bool {
        self.globals.read().unwrap().contains_key(&sym)
    }

    pub fn set_global(&self, sym: Symbol, value: Var) {
        self.globals.write().unwrap().insert(sym, value);
    }

    /// Installs a constant or callable under a name.
    pub fn register_global(&self, name: &str, value: Var) {
        let sym = self.intern(name);
        self.set_global(sym, value);
    }

    /// Installs a special form receiving raw argument expressions.
    pub fn register_native(&self, name: &str, f: NativeFn) {
        let value = self.var(Callable::Native(f));
        self.register_global(name, value);
    }

    /// Installs a host function over pre-evaluated arguments.
    pub fn register_function<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut Context, &[Var]) -> Result<Var, ScriptError> + Send + Sync + 'static,
    {
        let value = self.var(Callable::Function(Arc::new(f)));
        self.register_global(name, value);
    }
}
