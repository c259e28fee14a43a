pub mod builtins;
pub mod error;
pub mod eval;
pub mod options;
pub mod reader;
pub mod repl;
pub mod runtime;
pub mod symbols;
pub mod types;
pub mod value;
pub mod var;
pub mod vm;

pub use error::ScriptError;
pub use eval::Context;
pub use options::{EvalOptions, LookupPolicy};
pub use runtime::ScriptRuntime;
pub use symbols::Symbol;
pub use var::Var;

/// Evaluates a source string in a fresh runtime. Embedding hosts that need
/// registration or persistent state should build a [`ScriptRuntime`] and
/// [`Context`] themselves.
pub fn eval_source(source: &str, options: Option<EvalOptions>) -> Result<Var, ScriptError> {
    let runtime = ScriptRuntime::new(options.unwrap_or_default());
    let mut ctx = Context::new(runtime);
    ctx.eval_source(source)
}
