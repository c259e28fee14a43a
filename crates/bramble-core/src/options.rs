use std::env;

fn env_flag(name: &str) -> bool {
    let Ok(value) = env::var(name) else {
        return false;
    };
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn strict_vars_from_env() -> bool {
    env_flag("BRAMBLE_STRICT_VARS")
}

pub fn vm_trace_from_env() -> bool {
    env_flag("BRAMBLE_VM_TRACE")
}

/// Behavior of a symbol lookup that finds no binding anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupPolicy {
    /// Create a fresh binding in the current scope and yield its default
    /// value. This is the historically observed behavior.
    AutoBind,
    /// Report an unbound-symbol error.
    Strict,
}

#[derive(Clone, Debug)]
pub struct EvalOptions {
    pub lookup_policy: LookupPolicy,
    pub vm_trace: bool,
}

impl EvalOptions {
    pub fn strict() -> Self {
        Self {
            lookup_policy: LookupPolicy::Strict,
            ..Self::default()
        }
    }
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            lookup_policy: if strict_vars_from_env() {
                LookupPolicy::Strict
            } else {
                LookupPolicy::AutoBind
            },
            vm_trace: vm_trace_from_env(),
        }
    }
}
