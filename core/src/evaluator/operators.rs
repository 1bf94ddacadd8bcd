//! Binary, comparison and boolean operator implementations.

use core::cmp::Ordering;

use crate::errors::ProcedureError;
use crate::program::{BinaryOp, BoolOp, CompareOp};
use crate::values::Value;

/// Evaluate an arithmetic or concatenation operator.
///
/// Null in, null out. Numeric operands are widened to the wider of the two
/// types; integer arithmetic wraps instead of panicking.
pub(super) fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ProcedureError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Concat {
        return Ok(Value::string(format!("{}{}", left, right)));
    }

    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => eval_binary_int(op, *a as i64, *b as i64)
            .map(|v| Value::Integer(v as i32)),
        (Value::Double(_), _) | (_, Value::Double(_)) => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => eval_binary_float(op, a, b).map(Value::Double),
            _ => Err(operand_mismatch(op, &left, &right)),
        },
        _ => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => eval_binary_int(op, a, b).map(Value::Long),
            _ => Err(operand_mismatch(op, &left, &right)),
        },
    }
}

/// Integer arithmetic in 64 bits.
///
/// Results of two `integer` operands are truncated back to 32 bits by the
/// caller, which matches wrapping 32-bit arithmetic.
fn eval_binary_int(op: BinaryOp, left: i64, right: i64) -> Result<i64, ProcedureError> {
    match op {
        BinaryOp::Add => Ok(left.wrapping_add(right)),
        BinaryOp::Sub => Ok(left.wrapping_sub(right)),
        BinaryOp::Mul => Ok(left.wrapping_mul(right)),
        BinaryOp::Div | BinaryOp::Mod if right == 0 => Err(ProcedureError::DivisionByZero),
        // wrapping_div handles i64::MIN / -1
        BinaryOp::Div => Ok(left.wrapping_div(right)),
        BinaryOp::Mod => Ok(left.wrapping_rem(right)),
        BinaryOp::Concat => Err(not_numeric(op)),
    }
}

fn eval_binary_float(op: BinaryOp, left: f64, right: f64) -> Result<f64, ProcedureError> {
    match op {
        BinaryOp::Add => Ok(left + right),
        BinaryOp::Sub => Ok(left - right),
        BinaryOp::Mul => Ok(left * right),
        BinaryOp::Div | BinaryOp::Mod if right == 0.0 => Err(ProcedureError::DivisionByZero),
        BinaryOp::Div => Ok(left / right),
        BinaryOp::Mod => Ok(left % right),
        BinaryOp::Concat => Err(not_numeric(op)),
    }
}

fn not_numeric(op: BinaryOp) -> ProcedureError {
    ProcedureError::type_mismatch(format!("{:?}", op), "a numeric operator", "concatenation")
}

fn operand_mismatch(op: BinaryOp, left: &Value, right: &Value) -> ProcedureError {
    ProcedureError::type_mismatch(
        format!("operands of {:?}", op),
        "numeric values",
        format!("{} and {}", type_name(left), type_name(right)),
    )
}

pub(super) fn type_name(value: &Value) -> &'static str {
    value.data_type().map(|t| t.name()).unwrap_or("null")
}

/// Compare two values. Any null operand yields null.
pub(super) fn eval_compare(op: CompareOp, left: &Value, right: &Value) -> Result<Value, ProcedureError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let ordering = left.compare(right).ok_or_else(|| {
        ProcedureError::type_mismatch(
            "comparison",
            type_name(left),
            type_name(right),
        )
    })?;
    let result = match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    };
    Ok(Value::Boolean(result))
}

/// The value of `left op right` when `left` alone decides it, for
/// short-circuiting.
pub(super) fn short_circuit(op: BoolOp, left: Option<bool>) -> Option<bool> {
    match (op, left) {
        (BoolOp::And, Some(false)) => Some(false),
        (BoolOp::Or, Some(true)) => Some(true),
        _ => None,
    }
}

/// Three-valued AND/OR; `None` stands for unknown.
pub(super) fn eval_logical(op: BoolOp, left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match op {
        BoolOp::And => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BoolOp::Or => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    }
}
