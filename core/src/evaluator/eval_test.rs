use hashbrown::HashMap;
use pretty_assertions::assert_eq;

use super::*;
use crate::program::{BinaryOp, ProjectedColumn};
use crate::values::DataType;

/// Evaluation context backed by fixed variables and subquery results.
#[derive(Default)]
struct TestContext {
    variables: HashMap<String, Value>,
    subqueries: Vec<ResultSet>,
    block_first_subquery: bool,
    subquery_calls: usize,
    next_random: f64,
}

impl TestContext {
    fn with_var(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }
}

impl EvalContext for TestContext {
    fn variable(&self, name: &str) -> Result<Value, ProcedureError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ProcedureError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn subquery(&mut self, _query: &Query) -> Result<Fetch<ResultSet>, ProcedureError> {
        self.subquery_calls += 1;
        if self.block_first_subquery && self.subquery_calls == 1 {
            return Ok(Fetch::Blocked);
        }
        Ok(Fetch::Ready(self.subqueries.remove(0)))
    }

    fn random(&mut self) -> Result<f64, ProcedureError> {
        self.next_random += 0.25;
        Ok(self.next_random)
    }
}

fn eval(context: &mut TestContext, expr: &Expr) -> Result<Fetch<Value>, ProcedureError> {
    Evaluator::new(context, 1000).eval(expr)
}

fn eval_ok(context: &mut TestContext, expr: &Expr) -> Value {
    match eval(context, expr).unwrap() {
        Fetch::Ready(value) => value,
        Fetch::Blocked => panic!("unexpected block"),
    }
}

fn single(value: Value) -> ResultSet {
    ResultSet::new(vec![Column::new("x", DataType::Object)], vec![vec![value]])
}

fn any_query() -> Query {
    Query::values(vec![ProjectedColumn::new(
        "x",
        DataType::Integer,
        Expr::constant(1),
    )])
}

#[test]
fn test_variables_and_arithmetic() {
    let mut context = TestContext::default().with_var("x", 40);
    let expr = Expr::var("x").add(Expr::constant(2));
    assert_eq!(eval_ok(&mut context, &expr), Value::Integer(42));
}

#[test]
fn test_undefined_variable() {
    let mut context = TestContext::default();
    assert!(matches!(
        eval(&mut context, &Expr::var("missing")),
        Err(ProcedureError::UndefinedVariable { .. })
    ));
}

#[test]
fn test_error_message_concatenation() {
    let mut context = TestContext::default().with_var("e2", 5);
    let expr = Expr::constant("bad value ")
        .concat(Expr::var("e2"))
        .concat(Expr::constant(" at "))
        .concat(Expr::constant(1.5));
    assert_eq!(
        eval_ok(&mut context, &expr),
        Value::string("bad value 5 at 1.5")
    );
}

#[test]
fn test_case_picks_first_true_branch() {
    let mut context = TestContext::default().with_var("x", 15);
    let expr = Expr::Case {
        branches: vec![
            (
                Expr::var("x").less_than(Expr::constant(10)),
                Expr::constant("small"),
            ),
            (
                Expr::var("x").less_than(Expr::constant(20)),
                Expr::constant("medium"),
            ),
        ],
        otherwise: Some(Box::new(Expr::constant("large"))),
    };
    assert_eq!(eval_ok(&mut context, &expr), Value::string("medium"));
}

#[test]
fn test_negated_null_stays_null() {
    let mut context = TestContext::default().with_var("x", 3);
    let positive = Expr::var("x").greater_than(Expr::constant(1)).negate();
    assert_eq!(eval_ok(&mut context, &positive), Value::Boolean(false));
    let unknown = Expr::null().equals(Expr::constant(1)).negate();
    assert_eq!(eval_ok(&mut context, &unknown), Value::Null);
}

#[test]
fn test_null_condition_is_false() {
    let mut context = TestContext::default();
    let condition = Expr::null().equals(Expr::constant(1));
    let result = Evaluator::new(&mut context, 1000)
        .eval_condition(&condition)
        .unwrap();
    assert_eq!(result, Fetch::Ready(false));
}

#[test]
fn test_non_boolean_condition_is_rejected() {
    let mut context = TestContext::default();
    let result = Evaluator::new(&mut context, 1000).eval_condition(&Expr::constant(1));
    assert!(matches!(result, Err(ProcedureError::TypeMismatch { .. })));
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let mut context = TestContext::default();
    let expr = Expr::constant(false).and(Expr::var("never_read"));
    assert_eq!(eval_ok(&mut context, &expr), Value::Boolean(false));
}

#[test]
fn test_scalar_subquery() {
    let mut context = TestContext {
        subqueries: vec![single(Value::Integer(7))],
        ..Default::default()
    };
    let expr = Expr::subquery(any_query()).add(Expr::constant(1));
    assert_eq!(eval_ok(&mut context, &expr), Value::Integer(8));
}

#[test]
fn test_scalar_subquery_too_many_rows() {
    let mut context = TestContext {
        subqueries: vec![ResultSet::new(
            vec![Column::new("x", DataType::Integer)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        )],
        ..Default::default()
    };
    assert_eq!(
        eval(&mut context, &Expr::subquery(any_query())),
        Err(ProcedureError::SubqueryCardinality { rows: 2 })
    );
}

#[test]
fn test_blocked_subquery_propagates() {
    let mut context = TestContext {
        subqueries: vec![single(Value::Integer(1))],
        block_first_subquery: true,
        ..Default::default()
    };
    let expr = Expr::exists(any_query());
    assert_eq!(eval(&mut context, &expr), Ok(Fetch::Blocked));
    assert_eq!(eval(&mut context, &expr), Ok(Fetch::Ready(Value::Boolean(true))));
}

#[test]
fn test_rand_is_evaluated_each_time() {
    let mut context = TestContext::default();
    let expr = Expr::call("rand", vec![]);
    let first = eval_ok(&mut context, &expr);
    let second = eval_ok(&mut context, &expr);
    assert_ne!(first, second);
}

#[test]
fn test_cast() {
    let mut context = TestContext::default();
    let expr = Expr::constant("12").cast(DataType::Integer);
    assert_eq!(eval_ok(&mut context, &expr), Value::Integer(12));

    let bad = Expr::constant("twelve").cast(DataType::Integer);
    assert!(matches!(
        eval(&mut context, &bad),
        Err(ProcedureError::Conversion(_))
    ));
}

#[test]
fn test_columns_resolve_against_row() {
    let mut context = TestContext::default();
    let columns = vec![
        Column::new("g.e1", DataType::String),
        Column::new("g.e2", DataType::Integer),
    ];
    let row = vec![Value::string("a"), Value::Integer(5)];
    let expr = Expr::column("e2").add(Expr::constant(1));
    let result = Evaluator::new(&mut context, 1000)
        .with_row(&columns, &row)
        .eval(&expr)
        .unwrap();
    assert_eq!(result, Fetch::Ready(Value::Integer(6)));
}

#[test]
fn test_depth_limit() {
    let mut context = TestContext::default();
    let mut expr = Expr::constant(0);
    for _ in 0..50 {
        expr = Expr::binary(BinaryOp::Add, expr, Expr::constant(1));
    }
    let result = Evaluator::new(&mut context, 10).eval(&expr);
    assert!(matches!(
        result,
        Err(ProcedureError::ResourceExceeded { limit: 10, .. })
    ));
}

#[test]
fn test_bind_folds_variables() {
    let mut context = TestContext::default().with_var("threshold", 10);
    let filter = Expr::column("e2").greater_than(Expr::var("threshold").add(Expr::constant(1)));
    let bound = Evaluator::new(&mut context, 1000).bind(&filter).unwrap();
    assert_eq!(
        bound,
        Fetch::Ready(Expr::column("e2").greater_than(Expr::constant(11)))
    );
}

#[test]
fn test_eval_row_filter() {
    let columns = vec![Column::new("e2", DataType::Integer)];
    let filter = Expr::column("e2").equals(Expr::constant(5));
    assert!(eval_row_filter(&filter, &columns, &[Value::Integer(5)]).unwrap());
    assert!(!eval_row_filter(&filter, &columns, &[Value::Null]).unwrap());
    assert!(matches!(
        eval_row_expr(&Expr::var("x"), &columns, &[Value::Integer(5)]),
        Err(ProcedureError::UndefinedVariable { .. })
    ));
}
