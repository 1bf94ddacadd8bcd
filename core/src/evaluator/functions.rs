//! Built-in scalar functions.
//!
//! Every function here is deterministic; `rand` needs the statement's random
//! source and is dispatched by the evaluator itself. Apart from `coalesce`,
//! a null argument yields a null result.

use crate::errors::ProcedureError;
use crate::values::Value;

use super::operators::type_name;

type Builtin = fn(&[Value]) -> Result<Value, ProcedureError>;

struct Signature {
    name: &'static str,
    min_args: usize,
    max_args: usize,
    /// Whether any null argument short-circuits to null.
    null_in_null_out: bool,
    body: Builtin,
}

const BUILTINS: &[Signature] = &[
    sig("abs", 1, 1, true, abs),
    sig("coalesce", 1, usize::MAX, false, coalesce),
    sig("concat", 1, usize::MAX, true, concat),
    sig("ifnull", 2, 2, false, coalesce),
    sig("length", 1, 1, true, length),
    sig("lower", 1, 1, true, lower),
    sig("mod", 2, 2, true, modulo),
    sig("round", 1, 2, true, round),
    sig("substring", 2, 3, true, substring),
    sig("trim", 1, 1, true, trim),
    sig("upper", 1, 1, true, upper),
];

const fn sig(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    null_in_null_out: bool,
    body: Builtin,
) -> Signature {
    Signature {
        name,
        min_args,
        max_args,
        null_in_null_out,
        body,
    }
}

/// Call a deterministic built-in by (case-insensitive) name.
pub(super) fn call_builtin(name: &str, args: &[Value]) -> Result<Value, ProcedureError> {
    let signature = BUILTINS
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ProcedureError::UnknownFunction {
            name: name.to_string(),
        })?;
    if args.len() < signature.min_args || args.len() > signature.max_args {
        return Err(ProcedureError::ArgumentCount {
            name: signature.name.to_string(),
            expected: signature.min_args,
            actual: args.len(),
        });
    }
    if signature.null_in_null_out && args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    (signature.body)(args)
}

// ============================================================================
// String Functions
// ============================================================================

fn text<'v>(function: &str, value: &'v Value) -> Result<&'v str, ProcedureError> {
    value
        .as_str()
        .ok_or_else(|| ProcedureError::type_mismatch(function, "string", type_name(value)))
}

fn integer(function: &str, value: &Value) -> Result<i64, ProcedureError> {
    value
        .as_i64()
        .ok_or_else(|| ProcedureError::type_mismatch(function, "integer", type_name(value)))
}

/// Concatenate the text form of every argument.
fn concat(args: &[Value]) -> Result<Value, ProcedureError> {
    let joined: String = args.iter().map(|v| v.to_string()).collect();
    Ok(Value::string(joined))
}

/// Number of characters (not bytes).
fn length(args: &[Value]) -> Result<Value, ProcedureError> {
    let s = text("length", &args[0])?;
    Ok(Value::Integer(s.chars().count() as i32))
}

fn lower(args: &[Value]) -> Result<Value, ProcedureError> {
    Ok(Value::string(text("lower", &args[0])?.to_lowercase()))
}

fn upper(args: &[Value]) -> Result<Value, ProcedureError> {
    Ok(Value::string(text("upper", &args[0])?.to_uppercase()))
}

fn trim(args: &[Value]) -> Result<Value, ProcedureError> {
    Ok(Value::string(text("trim", &args[0])?.trim()))
}

/// `substring(s, start [, length])` with a 1-based start position.
fn substring(args: &[Value]) -> Result<Value, ProcedureError> {
    let s = text("substring", &args[0])?;
    let start = integer("substring", &args[1])?.max(1) as usize - 1;
    let chars = s.chars().skip(start);
    let result: String = match args.get(2) {
        Some(len) => {
            let len = integer("substring", len)?;
            if len < 0 {
                return Ok(Value::Null);
            }
            chars.take(len as usize).collect()
        }
        None => chars.collect(),
    };
    Ok(Value::string(result))
}

// ============================================================================
// Numeric Functions
// ============================================================================

fn abs(args: &[Value]) -> Result<Value, ProcedureError> {
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(i.wrapping_abs())),
        Value::Long(l) => Ok(Value::Long(l.wrapping_abs())),
        Value::Double(d) => Ok(Value::Double(d.abs())),
        other => Err(ProcedureError::type_mismatch(
            "abs",
            "a numeric value",
            type_name(other),
        )),
    }
}

fn modulo(args: &[Value]) -> Result<Value, ProcedureError> {
    super::operators::eval_binary(
        crate::program::BinaryOp::Mod,
        args[0].clone(),
        args[1].clone(),
    )
}

/// `round(x [, digits])`, half away from zero.
fn round(args: &[Value]) -> Result<Value, ProcedureError> {
    let digits = match args.get(1) {
        Some(d) => integer("round", d)?,
        None => 0,
    };
    match &args[0] {
        Value::Double(d) => {
            let factor = 10f64.powi(digits.clamp(-300, 300) as i32);
            Ok(Value::Double((d * factor).round() / factor))
        }
        v @ (Value::Integer(_) | Value::Long(_)) if digits >= 0 => Ok(v.clone()),
        Value::Integer(i) => Ok(Value::Integer(round_int(*i as i64, digits) as i32)),
        Value::Long(l) => Ok(Value::Long(round_int(*l, digits))),
        other => Err(ProcedureError::type_mismatch(
            "round",
            "a numeric value",
            type_name(other),
        )),
    }
}

fn round_int(value: i64, digits: i64) -> i64 {
    let factor = 10i64.checked_pow((-digits) as u32).unwrap_or(i64::MAX);
    let half = factor / 2;
    let adjusted = if value >= 0 {
        value.saturating_add(half)
    } else {
        value.saturating_sub(half)
    };
    adjusted / factor * factor
}

// ============================================================================
// Null Handling
// ============================================================================

/// First non-null argument.
fn coalesce(args: &[Value]) -> Result<Value, ProcedureError> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}
