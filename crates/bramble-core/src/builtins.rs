use crate::error::ScriptError;
use crate::eval::Context;
use crate::runtime::ScriptRuntime;
use crate::symbols::Symbol;
use crate::value::VarRef;
use crate::var::Var;

/// Installs the core natives and globals. Runs once per runtime, during
/// initialization, before any evaluation.
pub(crate) fn install(runtime: &ScriptRuntime) {
    runtime.register_native("do", native_do);
    runtime.register_native("while", native_while);
    runtime.register_native("if", native_if);
    runtime.register_native("set", native_set);
    runtime.register_native("global", native_global);

    runtime.register_function("+", fn_add);
    runtime.register_function("-", fn_sub);
    runtime.register_function("*", fn_mul);
    runtime.register_function("/", fn_div);
    runtime.register_function("%", fn_rem);
    runtime.register_function("=", fn_eq);
    runtime.register_function("<", fn_lt);
    runtime.register_function("<=", fn_le);
    runtime.register_function(">", fn_gt);
    runtime.register_function(">=", fn_ge);
    runtime.register_function("print", fn_print);
    runtime.register_function("typename", fn_typename);
}

/// Evaluates every expression in order, returns the last.
fn native_do(ctx: &mut Context, expr: &[Var]) -> Result<Var, ScriptError> {
    if expr.len() < 2 {
        return Ok(ctx.default_var());
    }
    for item in &expr[1..expr.len() - 1] {
        ctx.execute(item)?;
    }
    ctx.execute(&expr[expr.len() - 1])
}

/// Loops while the condition is truthy; yields the last body result, or
/// the default when the body never ran.
fn native_while(ctx: &mut Context, expr: &[Var]) -> Result<Var, ScriptError> {
    let mut result = ctx.default_var();
    if expr.len() < 3 {
        return Ok(result);
    }
    while ctx.execute(&expr[1])?.get::<bool>() {
        result = ctx.execute(&expr[2])?;
    }
    Ok(result)
}

fn native_if(ctx: &mut Context, expr: &[Var]) -> Result<Var, ScriptError> {
    if expr.len() > 2 {
        if ctx.execute(&expr[1])?.get::<bool>() {
            return ctx.execute(&expr[2]);
        } else if expr.len() > 3 {
            return ctx.execute(&expr[3]);
        }
    }
    Ok(ctx.default_var())
}

/// Assignment. A symbol target resolves to its binding; a binding already
/// holding a ref is written through. A non-symbol target is evaluated and
/// may name a binding (quoted symbol) or a ref value.
fn native_set(ctx: &mut Context, expr: &[Var]) -> Result<Var, ScriptError> {
    if expr.len() != 3 {
        return Ok(ctx.default_var());
    }
    if expr[1].is::<Symbol>() {
        let sym = unsafe { *expr[1].as_ref_unchecked::<Symbol>() };
        let current = ctx.lookup(sym).unwrap_or_default();
        if current.is::<VarRef>() {
            let slot = unsafe { current.as_ref_unchecked::<VarRef>() }.clone();
            let value = ctx.execute(&expr[2])?;
            slot.set(value.clone());
            return Ok(value);
        }
        let value = ctx.execute(&expr[2])?;
        return Ok(ctx.assign(sym, value));
    }
    let target = ctx.execute(&expr[1])?;
    if target.is::<Symbol>() {
        let sym = unsafe { *target.as_ref_unchecked::<Symbol>() };
        let value = ctx.execute(&expr[2])?;
        return Ok(ctx.assign(sym, value));
    }
    if target.is::<VarRef>() {
        let slot = unsafe { target.as_ref_unchecked::<VarRef>() }.clone();
        let value = ctx.execute(&expr[2])?;
        slot.set(value.clone());
        return Ok(value);
    }
    Ok(ctx.default_var())
}

/// Installs a binding in the process-wide global table, creating the slot
/// when it does not exist yet.
fn native_global(ctx: &mut Context, expr: &[Var]) -> Result<Var, ScriptError> {
    if expr.len() != 3 {
        return Ok(ctx.default_var());
    }
    let sym = if expr[1].is::<Symbol>() {
        unsafe { *expr[1].as_ref_unchecked::<Symbol>() }
    } else {
        let target = ctx.execute(&expr[1])?;
        if !target.is::<Symbol>() {
            return Ok(ctx.default_var());
        }
        unsafe { *target.as_ref_unchecked::<Symbol>() }
    };
    let value = ctx.execute(&expr[2])?;
    ctx.runtime().set_global(sym, value.clone());
    Ok(value)
}

fn int_args(args: &[Var]) -> impl Iterator<Item = i64> + '_ {
    args.iter().filter_map(|arg| {
        if arg.is::<i64>() {
            Some(unsafe { *arg.as_ref_unchecked::<i64>() })
        } else {
            None
        }
    })
}

/// Accumulates integer-typed arguments; other operands are ignored.
fn fn_add(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    let sum: i64 = int_args(args).sum();
    Ok(ctx.var(sum))
}

fn fn_sub(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    let ints: Vec<i64> = int_args(args).collect();
    let result = match ints.split_first() {
        None => 0,
        Some((first, [])) => -first,
        Some((first, rest)) => first - rest.iter().sum::<i64>(),
    };
    Ok(ctx.var(result))
}

fn fn_mul(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    let product: i64 = int_args(args).product();
    Ok(ctx.var(product))
}

fn fn_div(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    if args.len() == 2 && args[0].is::<i64>() && args[1].is::<i64>() {
        let a = unsafe { *args[0].as_ref_unchecked::<i64>() };
        let b = unsafe { *args[1].as_ref_unchecked::<i64>() };
        if b != 0 {
            return Ok(ctx.var(a / b));
        }
    }
    Ok(ctx.default_var())
}

fn fn_rem(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    if args.len() == 2 && args[0].is::<i64>() && args[1].is::<i64>() {
        let a = unsafe { *args[0].as_ref_unchecked::<i64>() };
        let b = unsafe { *args[1].as_ref_unchecked::<i64>() };
        if b != 0 {
            return Ok(ctx.var(a % b));
        }
    }
    Ok(ctx.default_var())
}

fn fn_eq(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    let equal = args.len() == 2 && args[0].semantic_eq(&args[1]);
    Ok(ctx.var(equal))
}

fn int_compare(
    ctx: &mut Context,
    args: &[Var],
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<Var, ScriptError> {
    if args.len() == 2 && args[0].is::<i64>() && args[1].is::<i64>() {
        let a = unsafe { *args[0].as_ref_unchecked::<i64>() };
        let b = unsafe { *args[1].as_ref_unchecked::<i64>() };
        return Ok(ctx.var(accept(a.cmp(&b))));
    }
    Ok(ctx.var(false))
}

fn fn_lt(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    int_compare(ctx, args, std::cmp::Ordering::is_lt)
}

fn fn_le(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    int_compare(ctx, args, std::cmp::Ordering::is_le)
}

fn fn_gt(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    int_compare(ctx, args, std::cmp::Ordering::is_gt)
}

fn fn_ge(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    int_compare(ctx, args, std::cmp::Ordering::is_ge)
}

fn fn_print(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    for arg in args {
        print!("{}", arg);
    }
    Ok(ctx.default_var())
}

fn fn_typename(ctx: &mut Context, args: &[Var]) -> Result<Var, ScriptError> {
    match args.first() {
        Some(arg) => {
            let label = arg.type_label().to_string();
            Ok(ctx.var(label))
        }
        None => Ok(ctx.default_var()),
    }
}
