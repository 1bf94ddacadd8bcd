use super::replay::ReplayLog;
use super::stack::Stack;
use crate::accounting::UpdateAccounting;
use crate::errors::ProcedureError;
use crate::program::{Block, Expr};
use crate::scope_stack::{BindError, ScopeStack};
use crate::temp_tables::TempTableStore;
use crate::values::{Column, DataType, ResultSet, Row, Value};

/// A procedure variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Variable {
    pub ty: DataType,
    pub value: Value,
}

impl Variable {
    pub fn new(ty: DataType, value: Value) -> Self {
        Self { ty, value }
    }
}

#[derive(Debug)]
pub(crate) enum FrameKind {
    /// The procedure body; finishing it finishes the procedure.
    Body,
    Block,
    While {
        condition: Expr,
    },
    /// A cursor loop over rows read when the loop was entered.
    Loop {
        cursor: String,
        columns: Vec<Column>,
        rows: Vec<Row>,
        position: usize,
    },
}

impl FrameKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, FrameKind::While { .. } | FrameKind::Loop { .. })
    }
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub block: Block,
    pub ip: usize,
    pub kind: FrameKind,
}

/// Lifecycle of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Running,
    Done,
    Failed,
    Closed,
}

/// Everything one execution of a program mutates.
#[derive(Debug)]
pub(crate) struct ExecutionState {
    pub frames: Stack<Frame>,
    pub scopes: ScopeStack<Variable>,
    pub temps: TempTableStore,
    pub replay: ReplayLog,
    pub accounting: UpdateAccounting,
    /// Rows of the last result-producing statement.
    pub result: Option<ResultSet>,
    pub status: Status,
    pub iterations: usize,
}

impl ExecutionState {
    pub fn new(max_nesting: usize) -> Self {
        Self {
            frames: Stack::new(max_nesting),
            scopes: ScopeStack::new(),
            temps: TempTableStore::new(),
            replay: ReplayLog::default(),
            accounting: UpdateAccounting::default(),
            result: None,
            status: Status::Ready,
            iterations: 0,
        }
    }

    /// Push a frame together with its variable and temp table scopes.
    pub fn enter(&mut self, block: Block, kind: FrameKind) -> Result<(), ProcedureError> {
        self.frames
            .push(Frame { block, ip: 0, kind })
            .map_err(|overflow| ProcedureError::ResourceExceeded {
                resource: "block nesting",
                limit: overflow.max_size,
            })?;
        self.open_scopes()
    }

    /// Pop the top frame and its scopes.
    pub fn exit(&mut self) -> Option<Frame> {
        self.close_scopes();
        self.frames.pop()
    }

    /// Run the top frame's block again with fresh scopes.
    pub fn restart(&mut self) -> Result<(), ProcedureError> {
        self.close_scopes();
        if let Some(frame) = self.frames.peek_mut() {
            frame.ip = 0;
        }
        self.open_scopes()
    }

    fn open_scopes(&mut self) -> Result<(), ProcedureError> {
        self.scopes.push_frame();
        self.temps.push_scope();
        if let Some(Frame {
            kind:
                FrameKind::Loop {
                    cursor,
                    columns,
                    rows,
                    position,
                },
            ..
        }) = self.frames.peek()
        {
            if let Some(row) = rows.get(*position) {
                for (column, value) in columns.iter().zip(row) {
                    let name = format!("{}.{}", cursor, column.short_name());
                    self.scopes
                        .declare(&name, Variable::new(column.ty, value.clone()))
                        .map_err(|err| bind_error(&name, err))?;
                }
            }
        }
        Ok(())
    }

    fn close_scopes(&mut self) {
        self.scopes.pop_frame().ok();
        self.temps.pop_scope();
    }

    /// Release every frame, scope, temp table and open request.
    pub fn clear(&mut self) {
        self.replay.finish();
        self.frames.clear();
        self.scopes.clear();
        self.temps.clear();
        self.result = None;
    }
}

pub(crate) fn bind_error(name: &str, err: BindError) -> ProcedureError {
    match err {
        BindError::AlreadyBound(_) => ProcedureError::VariableAlreadyDeclared {
            name: name.to_string(),
        },
        BindError::NoScope => ProcedureError::InvalidProgram {
            message: format!("no block open to declare {}", name),
        },
    }
}
