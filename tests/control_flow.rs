mod cases;

use cases::*;
use pretty_assertions::assert_eq;
use vproc::program::{Block, Expr, Instruction, Query};
use vproc::{DataType, EngineOptions, ExecutionOptions, ProcedureError, Program, Value};

fn total() -> Instruction {
    select_value("total", DataType::Integer, Expr::var("total"))
}

fn declare_total() -> Instruction {
    Instruction::declare("total", DataType::Integer, Some(Expr::constant(0).into()))
}

fn add_cursor_to_total() -> Instruction {
    Instruction::assign("total", Expr::var("total").add(Expr::var("c.e2")))
}

fn scan_e2() -> Query {
    Query::scan("pm1.g1").select(vec![g1_e2()])
}

#[test]
fn loop_with_break_then_full_loop() {
    let program = Program::virtual_procedure(
        "pm1.sq_break",
        vec![
            declare_total(),
            Instruction::loop_on(scan_e2(), "c", vec![add_cursor_to_total(), Instruction::Break]),
            Instruction::loop_on(scan_e2(), "c", vec![add_cursor_to_total()]),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[76])]);
}

#[test]
fn loop_over_empty_source_skips_body() {
    let program = Program::virtual_procedure(
        "pm1.sq_empty",
        vec![
            declare_total(),
            Instruction::loop_on(
                scan_e2().filter(Expr::column("e2").greater_than(Expr::constant(100))),
                "c",
                vec![Instruction::error(Expr::constant("unreachable"))],
            ),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[0])]);
}

#[test]
fn loop_body_gets_fresh_scope_per_row() {
    // Redeclaring inside the body would fail if the scope survived the row.
    let program = Program::virtual_procedure(
        "pm1.sq_scope",
        vec![
            declare_total(),
            Instruction::loop_on(
                scan_e2(),
                "c",
                vec![
                    Instruction::declare("doubled", DataType::Integer, Some(Expr::var("c.e2").add(Expr::var("c.e2")).into())),
                    Instruction::assign("total", Expr::var("total").add(Expr::var("doubled"))),
                ],
            ),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[142])]);
}

#[test]
fn while_with_continue() {
    let program = Program::virtual_procedure(
        "pm1.sq_while",
        vec![
            Instruction::declare("i", DataType::Integer, Some(Expr::constant(0).into())),
            declare_total(),
            Instruction::while_loop(
                Expr::var("i").less_than(Expr::constant(5)),
                vec![
                    Instruction::assign("i", Expr::var("i").add(Expr::constant(1))),
                    Instruction::if_then(
                        Expr::var("i").equals(Expr::constant(3)),
                        vec![Instruction::Continue],
                        None,
                    ),
                    Instruction::assign("total", Expr::var("total").add(Expr::var("i"))),
                ],
            ),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[1 + 2 + 4 + 5])]);
}

#[test]
fn break_leaves_only_the_innermost_loop() {
    let program = Program::virtual_procedure(
        "pm1.sq_nested",
        vec![
            declare_total(),
            Instruction::loop_on(
                scan_e2(),
                "c",
                vec![
                    Instruction::while_loop(
                        Expr::constant(true),
                        vec![
                            Instruction::Block(Block::new(vec![Instruction::Break])),
                            Instruction::error(Expr::constant("not reached")),
                        ],
                    ),
                    add_cursor_to_total(),
                ],
            ),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[71])]);
}

#[test]
fn if_else_branches() {
    let branch = |flag: bool| {
        Program::virtual_procedure(
            "pm1.sq_if",
            vec![
                Instruction::declare("label", DataType::String, None),
                Instruction::if_then(
                    Expr::constant(flag),
                    vec![Instruction::assign("label", Expr::constant("then"))],
                    Some(Block::new(vec![Instruction::assign(
                        "label",
                        Expr::constant("else"),
                    )])),
                ),
                select_value("label", DataType::String, Expr::var("label")),
            ],
        )
    };
    let engine = engine(vec![]);
    let data = data();
    assert_eq!(
        run(&engine, branch(true), &data).unwrap().rows,
        vec![vec![Value::string("then")]]
    );
    assert_eq!(
        run(&engine, branch(false), &data).unwrap().rows,
        vec![vec![Value::string("else")]]
    );
}

#[test]
fn null_condition_is_false() {
    let program = Program::virtual_procedure(
        "pm1.sq_null",
        vec![
            declare_total(),
            Instruction::if_then(
                Expr::null().equals(Expr::constant(1)),
                vec![Instruction::assign("total", Expr::constant(1))],
                None,
            ),
            total(),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[0])]);
}

#[test]
fn block_variables_go_out_of_scope() {
    let program = Program::virtual_procedure(
        "pm1.sq_block",
        vec![
            Instruction::Block(Block::new(vec![Instruction::declare(
                "inner",
                DataType::Integer,
                Some(Expr::constant(1).into()),
            )])),
            select_value("inner", DataType::Integer, Expr::var("inner")),
        ],
    );
    let result = run(&engine(vec![]), program, &data());
    assert!(matches!(
        result,
        Err(ProcedureError::UndefinedVariable { name }) if name == "inner"
    ));
}

#[test]
fn redeclaring_in_same_block_fails() {
    let program = Program::virtual_procedure(
        "pm1.sq_dup",
        vec![
            Instruction::declare("x", DataType::Integer, None),
            Instruction::declare("X", DataType::Integer, None),
        ],
    );
    let result = run(&engine(vec![]), program, &data());
    assert!(matches!(result, Err(ProcedureError::VariableAlreadyDeclared { .. })));
}

#[test]
fn shadowing_in_nested_block() {
    let program = Program::virtual_procedure(
        "pm1.sq_shadow",
        vec![
            Instruction::declare("x", DataType::Integer, Some(Expr::constant(1).into())),
            Instruction::Block(Block::new(vec![
                Instruction::declare("x", DataType::Integer, Some(Expr::constant(2).into())),
                Instruction::assign("x", Expr::constant(3)),
            ])),
            select_value("x", DataType::Integer, Expr::var("x")),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![ints(&[1])]);
}

#[test]
fn assignment_converts_to_declared_type() {
    let program = Program::virtual_procedure(
        "pm1.sq_convert",
        vec![
            Instruction::declare("x", DataType::Long, None),
            Instruction::assign("x", Expr::constant(4)),
            select_value("x", DataType::Object, Expr::var("x")),
        ],
    );
    let result = run(&engine(vec![]), program, &data()).unwrap();
    assert_eq!(result.rows, vec![vec![Value::Long(4)]]);
}

#[test]
fn iteration_limit() {
    let options = EngineOptions {
        default_execution_options: ExecutionOptions {
            max_iterations: Some(10),
            ..ExecutionOptions::default()
        },
        ..EngineOptions::default()
    };
    let engine = vproc::Engine::new(vproc::MapCatalog::new(), options);
    let program = Program::virtual_procedure(
        "pm1.sq_forever",
        vec![Instruction::while_loop(Expr::constant(true), vec![])],
    );
    let result = run(&engine, program, &data());
    assert!(matches!(
        result,
        Err(ProcedureError::ResourceExceeded {
            resource: "loop iterations",
            limit: 10
        })
    ));
}

#[test]
fn break_outside_loop_is_rejected_before_running() {
    let program = Program::virtual_procedure("pm1.sq_bad", vec![Instruction::Break]);
    let result = run(&engine(vec![]), program, &data());
    assert!(matches!(result, Err(ProcedureError::InvalidProgram { .. })));
}
