//! Fixtures shared by the integration tests: a small base-group data set, a
//! procedure catalog builder and a dynamic SQL compiler that looks
//! statements up by their text.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use vproc::program::{Expr, Instruction, ProjectedColumn, Query};
use vproc::{
    BlockMode, Column, CommandContext, CompileError, CompileRequest, CompiledCommand, DataType,
    Engine, EngineOptions, MapCatalog, MemoryDataManager, ProcedureError, ProcedurePlan, Program,
    QueryCompiler, ResultSet, Step, Value,
};

pub static G1_COLUMNS: Lazy<Vec<Column>> = Lazy::new(|| {
    vec![
        Column::new("e1", DataType::String),
        Column::new("e2", DataType::Integer),
    ]
});

/// `pm1.g1` holds e2 = 5, 15, 51; `pm1.g2` holds two rows with e2 = 5.
pub fn data() -> MemoryDataManager {
    data_with(BlockMode::Never)
}

pub fn data_with(mode: BlockMode) -> MemoryDataManager {
    MemoryDataManager::new()
        .with_block_mode(mode)
        .with_table(
            "pm1.g1",
            G1_COLUMNS.clone(),
            vec![
                vec![Value::string("a"), Value::Integer(5)],
                vec![Value::string("b"), Value::Integer(15)],
                vec![Value::string("c"), Value::Integer(51)],
            ],
        )
        .with_table(
            "pm1.g2",
            G1_COLUMNS.clone(),
            vec![
                vec![Value::string("x"), Value::Integer(5)],
                vec![Value::string("y"), Value::Integer(5)],
                vec![Value::string("z"), Value::Integer(0)],
            ],
        )
}

/// `SELECT <expr> AS <name>` with no source.
pub fn select_value(name: &str, ty: DataType, expr: Expr) -> Instruction {
    Instruction::select(Query::values(vec![ProjectedColumn::new(name, ty, expr)]))
}

pub fn g1_e2() -> ProjectedColumn {
    ProjectedColumn::column("e2", DataType::Integer)
}

/// A compiler for tests: every statement it accepts is registered up front,
/// keyed by its text with whitespace and case normalized.
#[derive(Default)]
pub struct FakeCompiler {
    statements: BTreeMap<String, CompiledCommand>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sql: &str, command: CompiledCommand) -> Self {
        self.statements.insert(normalize(sql), command);
        self
    }
}

impl QueryCompiler for FakeCompiler {
    fn compile(
        &self,
        sql: &str,
        _request: &CompileRequest<'_>,
    ) -> Result<CompiledCommand, CompileError> {
        self.statements
            .get(&normalize(sql))
            .cloned()
            .ok_or_else(|| {
                let start = sql.find(char::is_whitespace).map_or(0, |i| i + 1);
                CompileError::new(format!("cannot parse `{}`", sql)).with_span(start..sql.len())
            })
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

pub fn engine(procedures: Vec<Program>) -> Engine {
    engine_with(procedures, FakeCompiler::new())
}

pub fn engine_with(procedures: Vec<Program>, compiler: FakeCompiler) -> Engine {
    let catalog = procedures
        .into_iter()
        .fold(MapCatalog::new(), |catalog, program| catalog.with(program));
    Engine::new(catalog, EngineOptions::default()).with_compiler(compiler)
}

/// Run a program that is not in the catalog.
pub fn run(
    engine: &Engine,
    program: Program,
    data: &MemoryDataManager,
) -> Result<ResultSet, ProcedureError> {
    let mut plan = engine.prepare(Arc::new(program), vec![], context())?;
    engine.execute(&mut plan, data)
}

pub fn context() -> CommandContext {
    CommandContext::new("test").with_seed(7)
}

/// Step a plan by hand, counting the blocked polls it reported.
pub fn drive(
    engine: &Engine,
    plan: &mut ProcedurePlan,
    data: &MemoryDataManager,
) -> Result<(ResultSet, usize), ProcedureError> {
    let env = engine.env(data);
    let mut blocked = 0;
    loop {
        match plan.step(env)? {
            Step::Continue => {}
            Step::Blocked => blocked += 1,
            Step::Done(result) => return Ok((result, blocked)),
        }
    }
}

pub fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}
