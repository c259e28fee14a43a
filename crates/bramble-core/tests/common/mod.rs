#![allow(dead_code)]

use std::sync::Arc;

use bramble_core::eval::Context;
use bramble_core::options::{EvalOptions, LookupPolicy};
use bramble_core::runtime::ScriptRuntime;
use bramble_core::var::Var;

pub fn auto_options() -> EvalOptions {
    EvalOptions {
        lookup_policy: LookupPolicy::AutoBind,
        vm_trace: false,
    }
}

pub fn strict_options() -> EvalOptions {
    EvalOptions {
        lookup_policy: LookupPolicy::Strict,
        vm_trace: false,
    }
}

pub fn new_runtime() -> Arc<ScriptRuntime> {
    ScriptRuntime::new(auto_options())
}

pub fn new_context() -> Context {
    Context::new(new_runtime())
}

pub fn eval(source: &str) -> Var {
    new_context().eval_source(source).expect("eval")
}

pub fn eval_int(source: &str) -> i64 {
    let value = eval(source);
    assert!(value.is::<i64>(), "expected int, got {}", value.type_label());
    value.get::<i64>()
}
