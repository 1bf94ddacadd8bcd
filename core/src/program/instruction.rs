use serde::{Deserialize, Serialize};

use super::{Block, Command, Dml, DynamicSql, Expr, ProcedureCall, Query};
use crate::values::{Column, DataType};

/// Right-hand side of an assignment or declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assignment {
    Expr(Expr),
    /// The command must produce exactly one row; its first column is the
    /// assigned value. DML produces its update count.
    Command(Command),
}

impl From<Expr> for Assignment {
    fn from(expr: Expr) -> Self {
        Assignment::Expr(expr)
    }
}

impl From<Command> for Assignment {
    fn from(command: Command) -> Self {
        Assignment::Command(command)
    }
}

/// One statement of a procedure body.
///
/// Instructions never carry execution state; the executor keeps instruction
/// pointers and cursors on its own frame stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// `DECLARE <type> <name> [= <value>]`
    Declare {
        name: String,
        ty: DataType,
        value: Option<Assignment>,
    },
    /// `<variable> = <value>`
    Assign {
        variable: String,
        value: Assignment,
    },
    If {
        condition: Expr,
        then: Block,
        otherwise: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    /// `LOOP ON (<source>) AS <cursor> <body>`
    Loop {
        source: Command,
        cursor: String,
        body: Block,
    },
    Break,
    Continue,
    /// `ERROR <message>`
    Error {
        message: Expr,
    },
    CreateTempTable {
        name: String,
        columns: Vec<Column>,
    },
    DropTempTable {
        name: String,
    },
    ExecuteDynamicSql(Box<DynamicSql>),
    /// `EXEC <procedure>(<args>) [INTO <temp>]`
    ExecuteSubprogram {
        call: ProcedureCall,
        into: Option<String>,
    },
    /// Insert, update or delete against a temp table or a base group.
    ExecuteCommand(Dml),
    /// `<query> [INTO <temp>]`
    Select {
        query: Query,
        into: Option<String>,
    },
    /// Nested `BEGIN ... END`.
    Block(Block),
}

impl Instruction {
    pub fn declare(name: impl Into<String>, ty: DataType, value: Option<Assignment>) -> Self {
        Instruction::Declare {
            name: name.into(),
            ty,
            value,
        }
    }

    pub fn assign(variable: impl Into<String>, value: impl Into<Assignment>) -> Self {
        Instruction::Assign {
            variable: variable.into(),
            value: value.into(),
        }
    }

    pub fn if_then(condition: Expr, then: impl Into<Block>, otherwise: Option<Block>) -> Self {
        Instruction::If {
            condition,
            then: then.into(),
            otherwise,
        }
    }

    pub fn while_loop(condition: Expr, body: impl Into<Block>) -> Self {
        Instruction::While {
            condition,
            body: body.into(),
        }
    }

    pub fn loop_on(
        source: impl Into<Command>,
        cursor: impl Into<String>,
        body: impl Into<Block>,
    ) -> Self {
        Instruction::Loop {
            source: source.into(),
            cursor: cursor.into(),
            body: body.into(),
        }
    }

    pub fn error(message: Expr) -> Self {
        Instruction::Error { message }
    }

    pub fn create_temp(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Instruction::CreateTempTable {
            name: name.into(),
            columns,
        }
    }

    pub fn drop_temp(name: impl Into<String>) -> Self {
        Instruction::DropTempTable { name: name.into() }
    }

    pub fn dynamic(sql: DynamicSql) -> Self {
        Instruction::ExecuteDynamicSql(Box::new(sql))
    }

    pub fn exec(call: ProcedureCall, into: Option<String>) -> Self {
        Instruction::ExecuteSubprogram { call, into }
    }

    pub fn select(query: Query) -> Self {
        Instruction::Select { query, into: None }
    }

    pub fn select_into(query: Query, into: impl Into<String>) -> Self {
        Instruction::Select {
            query,
            into: Some(into.into()),
        }
    }

    /// Short name used in trace output.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Declare { .. } => "declare",
            Instruction::Assign { .. } => "assign",
            Instruction::If { .. } => "if",
            Instruction::While { .. } => "while",
            Instruction::Loop { .. } => "loop",
            Instruction::Break => "break",
            Instruction::Continue => "continue",
            Instruction::Error { .. } => "error",
            Instruction::CreateTempTable { .. } => "create temp",
            Instruction::DropTempTable { .. } => "drop temp",
            Instruction::ExecuteDynamicSql(_) => "execute string",
            Instruction::ExecuteSubprogram { .. } => "exec",
            Instruction::ExecuteCommand(_) => "dml",
            Instruction::Select { .. } => "select",
            Instruction::Block(_) => "block",
        }
    }
}
