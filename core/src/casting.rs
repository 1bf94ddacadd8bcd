//! Type conversion rules.
//!
//! Two kinds of conversion exist:
//!
//! - **Implicit** conversions are applied silently whenever a value flows into
//!   a typed slot: a declared variable, a temp table column, a procedure
//!   parameter or a declared dynamic SQL column. Only widening conversions and
//!   conversions to `string`/`object` are implicit.
//! - **Explicit** conversions back the `CAST` expression and may fail at
//!   runtime (e.g. parsing `'abc'` as an integer).

use thiserror::Error;

use crate::values::{DataType, Value};

/// Errors raised while converting values between data types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    #[error("no implicit conversion from {from} to {to}")]
    NotImplicit { from: DataType, to: DataType },

    #[error("cannot convert '{value}' to {to}")]
    Invalid { value: String, to: DataType },

    #[error("value {value} is out of range for {to}")]
    OutOfRange { value: String, to: DataType },
}

/// Check if values of type `from` may flow into a slot of type `to` without
/// an explicit CAST.
pub fn is_implicit(from: DataType, to: DataType) -> bool {
    use DataType::*;
    from == to
        || matches!(to, Object | String)
        || matches!((from, to), (Integer, Long) | (Integer, Double) | (Long, Double))
}

/// Validate an implicit conversion at the type level.
pub fn validate_implicit(from: DataType, to: DataType) -> Result<(), CastError> {
    if is_implicit(from, to) {
        Ok(())
    } else {
        Err(CastError::NotImplicit { from, to })
    }
}

/// Convert a value to `to`, allowing only implicit conversions.
pub fn convert_implicit(value: Value, to: DataType) -> Result<Value, CastError> {
    let Some(from) = value.data_type() else {
        return Ok(Value::Null);
    };
    validate_implicit(from, to)?;
    convert(value, to)
}

/// Convert a value to `to` with explicit CAST semantics.
pub fn convert(value: Value, to: DataType) -> Result<Value, CastError> {
    if value.is_null() || to == DataType::Object || value.data_type() == Some(to) {
        return Ok(value);
    }

    match to {
        DataType::String => Ok(Value::string(value.to_string())),
        DataType::Boolean => to_boolean(value),
        DataType::Integer => {
            let wide = to_long(value, to)?;
            i32::try_from(wide)
                .map(Value::Integer)
                .map_err(|_| CastError::OutOfRange {
                    value: wide.to_string(),
                    to,
                })
        }
        DataType::Long => to_long(value, to).map(Value::Long),
        DataType::Double => match value {
            Value::Boolean(b) => Ok(Value::Double(if b { 1.0 } else { 0.0 })),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| invalid(&s, to)),
            other => other.as_f64().map(Value::Double).ok_or_else(|| invalid(&other, to)),
        },
        DataType::Object => Ok(value),
    }
}

fn to_boolean(value: Value) -> Result<Value, CastError> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(Value::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(Value::Boolean(false))
            } else {
                Err(invalid(&s, DataType::Boolean))
            }
        }
        other => other
            .as_f64()
            .map(|n| Value::Boolean(n != 0.0))
            .ok_or_else(|| invalid(&other, DataType::Boolean)),
    }
}

fn to_long(value: Value, to: DataType) -> Result<i64, CastError> {
    match value {
        Value::Integer(i) => Ok(i as i64),
        Value::Long(l) => Ok(l),
        Value::Boolean(b) => Ok(b as i64),
        Value::Double(d) => {
            let truncated = d.trunc();
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64
            {
                Ok(truncated as i64)
            } else {
                Err(CastError::OutOfRange {
                    value: d.to_string(),
                    to,
                })
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid(&s, to)),
        Value::Null => Err(invalid(&Value::Null, to)),
    }
}

fn invalid(value: &impl core::fmt::Display, to: DataType) -> CastError {
    CastError::Invalid {
        value: value.to_string(),
        to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_widening() {
        assert!(is_implicit(DataType::Integer, DataType::Long));
        assert!(is_implicit(DataType::Integer, DataType::Double));
        assert!(is_implicit(DataType::Boolean, DataType::String));
        assert!(is_implicit(DataType::Double, DataType::Object));
        assert!(!is_implicit(DataType::Long, DataType::Integer));
        assert!(!is_implicit(DataType::String, DataType::Integer));
    }

    #[test]
    fn test_convert_implicit_rejects_text_to_integer() {
        let result = convert_implicit(Value::string("12"), DataType::Integer);
        assert_eq!(
            result,
            Err(CastError::NotImplicit {
                from: DataType::String,
                to: DataType::Integer
            })
        );
    }

    #[test]
    fn test_convert_implicit_null() {
        assert_eq!(
            convert_implicit(Value::Null, DataType::Integer),
            Ok(Value::Null)
        );
    }

    #[test]
    fn test_explicit_parse() {
        assert_eq!(
            convert(Value::string(" 42 "), DataType::Integer),
            Ok(Value::Integer(42))
        );
        assert_eq!(
            convert(Value::string("TRUE"), DataType::Boolean),
            Ok(Value::Boolean(true))
        );
        assert!(matches!(
            convert(Value::string("abc"), DataType::Long),
            Err(CastError::Invalid { .. })
        ));
    }

    #[test]
    fn test_explicit_range() {
        assert!(matches!(
            convert(Value::Long(i64::MAX), DataType::Integer),
            Err(CastError::OutOfRange { .. })
        ));
        assert_eq!(
            convert(Value::Double(7.9), DataType::Integer),
            Ok(Value::Integer(7))
        );
    }
}
