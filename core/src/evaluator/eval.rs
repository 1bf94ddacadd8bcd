//! Core evaluation logic.

use crate::{
    casting,
    data::{Fetch, return_if_blocked},
    errors::ProcedureError,
    evaluator::{
        EvalContext,
        functions::call_builtin,
        operators::{eval_binary, eval_compare, eval_logical, short_circuit, type_name},
    },
    program::Expr,
    values::{Column, Value, find_column},
};

/// Evaluator for resolved scalar expressions.
///
/// Evaluation may need rows from a source (scalar subqueries, EXISTS) and
/// can therefore block; every method returns `Fetch::Blocked` in that case
/// and may be retried from scratch.
pub struct Evaluator<'c, 'r, C: EvalContext + ?Sized> {
    context: &'c mut C,
    row: Option<(&'r [Column], &'r [Value])>,
    depth: usize,
    max_depth: usize,
}

impl<'c, 'r, C: EvalContext + ?Sized> Evaluator<'c, 'r, C> {
    pub fn new(context: &'c mut C, max_depth: usize) -> Self {
        Self {
            context,
            row: None,
            depth: 0,
            max_depth,
        }
    }

    /// Evaluate column references against `row`.
    pub fn with_row(mut self, columns: &'r [Column], row: &'r [Value]) -> Self {
        self.row = Some((columns, row));
        self
    }

    /// Evaluate an expression node.
    pub fn eval(&mut self, expr: &Expr) -> Result<Fetch<Value>, ProcedureError> {
        // Check depth before recursing
        if self.depth >= self.max_depth {
            return Err(ProcedureError::ResourceExceeded {
                resource: "expression depth",
                limit: self.max_depth,
            });
        }

        self.depth += 1;
        let result = self.eval_inner(expr);
        self.depth -= 1;

        result
    }

    /// Evaluate a condition; null counts as false.
    pub fn eval_condition(&mut self, expr: &Expr) -> Result<Fetch<bool>, ProcedureError> {
        let value = return_if_blocked!(self.eval(expr));
        Ok(Fetch::Ready(truth(&value, "condition")?.unwrap_or(false)))
    }

    /// Fold every sub-expression that does not read the current row into a
    /// constant, leaving an expression a data source can evaluate on its own.
    pub fn bind(&mut self, expr: &Expr) -> Result<Fetch<Expr>, ProcedureError> {
        if !expr.references_columns() {
            let value = return_if_blocked!(self.eval(expr));
            return Ok(Fetch::Ready(Expr::Constant(value)));
        }
        let bound = match expr {
            Expr::Binary { op, left, right } => {
                let left = return_if_blocked!(self.bind(left));
                let right = return_if_blocked!(self.bind(right));
                Expr::binary(*op, left, right)
            }
            Expr::Compare { op, left, right } => {
                let left = return_if_blocked!(self.bind(left));
                let right = return_if_blocked!(self.bind(right));
                Expr::compare(*op, left, right)
            }
            Expr::Logical { op, left, right } => Expr::Logical {
                op: *op,
                left: Box::new(return_if_blocked!(self.bind(left))),
                right: Box::new(return_if_blocked!(self.bind(right))),
            },
            Expr::Not(inner) => Expr::Not(Box::new(return_if_blocked!(self.bind(inner)))),
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(return_if_blocked!(self.bind(expr))),
                negated: *negated,
            },
            Expr::Cast { expr, ty } => Expr::Cast {
                expr: Box::new(return_if_blocked!(self.bind(expr))),
                ty: *ty,
            },
            Expr::Function { name, args } => {
                let mut bound = Vec::with_capacity(args.len());
                for arg in args {
                    bound.push(return_if_blocked!(self.bind(arg)));
                }
                Expr::call(name.clone(), bound)
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                let mut bound = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    let when = return_if_blocked!(self.bind(when));
                    let then = return_if_blocked!(self.bind(then));
                    bound.push((when, then));
                }
                let otherwise = match otherwise {
                    Some(e) => Some(Box::new(return_if_blocked!(self.bind(e)))),
                    None => None,
                };
                Expr::Case {
                    branches: bound,
                    otherwise,
                }
            }
            // Only column references reach this point.
            other => other.clone(),
        };
        Ok(Fetch::Ready(bound))
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Fetch<Value>, ProcedureError> {
        let value = match expr {
            Expr::Constant(value) => value.clone(),
            Expr::Variable(name) => self.context.variable(name)?,
            Expr::Column(name) => self.column(name)?,
            Expr::Binary { op, left, right } => {
                let left = return_if_blocked!(self.eval(left));
                let right = return_if_blocked!(self.eval(right));
                eval_binary(*op, left, right)?
            }
            Expr::Compare { op, left, right } => {
                let left = return_if_blocked!(self.eval(left));
                let right = return_if_blocked!(self.eval(right));
                eval_compare(*op, &left, &right)?
            }
            Expr::Logical { op, left, right } => {
                let left_value = return_if_blocked!(self.eval(left));
                let left = truth(&left_value, "logical operand")?;
                if let Some(result) = short_circuit(*op, left) {
                    return Ok(Fetch::Ready(Value::Boolean(result)));
                }
                let right_value = return_if_blocked!(self.eval(right));
                let right = truth(&right_value, "logical operand")?;
                eval_logical(*op, left, right).map_or(Value::Null, Value::Boolean)
            }
            Expr::Not(inner) => {
                let value = return_if_blocked!(self.eval(inner));
                truth(&value, "NOT operand")?.map_or(Value::Null, |b| Value::Boolean(!b))
            }
            Expr::IsNull { expr, negated } => {
                let value = return_if_blocked!(self.eval(expr));
                Value::Boolean(value.is_null() != *negated)
            }
            Expr::Function { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(return_if_blocked!(self.eval(arg)));
                }
                if name.eq_ignore_ascii_case("rand") {
                    if !values.is_empty() {
                        return Err(ProcedureError::ArgumentCount {
                            name: "rand".to_string(),
                            expected: 0,
                            actual: values.len(),
                        });
                    }
                    Value::Double(self.context.random()?)
                } else {
                    call_builtin(name, &values)?
                }
            }
            Expr::Cast { expr, ty } => {
                let value = return_if_blocked!(self.eval(expr));
                casting::convert(value, *ty)?
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                for (when, then) in branches {
                    if return_if_blocked!(self.eval_condition(when)) {
                        return self.eval(then);
                    }
                }
                match otherwise {
                    Some(otherwise) => return_if_blocked!(self.eval(otherwise)),
                    None => Value::Null,
                }
            }
            Expr::ScalarSubquery(query) => {
                let result = return_if_blocked!(self.context.subquery(query));
                match result.rows.len() {
                    0 => Value::Null,
                    1 => result.rows[0].first().cloned().unwrap_or(Value::Null),
                    rows => return Err(ProcedureError::SubqueryCardinality { rows }),
                }
            }
            Expr::Exists(query) => {
                let result = return_if_blocked!(self.context.subquery(query));
                Value::Boolean(!result.rows.is_empty())
            }
        };
        Ok(Fetch::Ready(value))
    }

    fn column(&self, name: &str) -> Result<Value, ProcedureError> {
        self.row
            .and_then(|(columns, row)| find_column(columns, name).and_then(|i| row.get(i)))
            .cloned()
            .ok_or_else(|| ProcedureError::UnknownColumn {
                name: name.to_string(),
            })
    }
}

/// Boolean view of a value; `None` for null.
pub(super) fn truth(value: &Value, context: &str) -> Result<Option<bool>, ProcedureError> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(ProcedureError::type_mismatch(
            context,
            "boolean",
            type_name(other),
        )),
    }
}
