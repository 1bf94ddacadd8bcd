use serde::{Deserialize, Serialize};

use super::Expr;
use crate::values::{Column, DataType};

/// One output column of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub name: String,
    pub ty: DataType,
    pub expr: Expr,
}

impl ProjectedColumn {
    pub fn new(name: impl Into<String>, ty: DataType, expr: Expr) -> Self {
        Self {
            name: name.into(),
            ty,
            expr,
        }
    }

    /// Project a source column under its own name.
    pub fn column(name: impl Into<String>, ty: DataType) -> Self {
        let name = name.into();
        let expr = Expr::Column(name.clone());
        Self { name, ty, expr }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// `SELECT *`: every column of the source, unchanged.
    All,
    Columns(Vec<ProjectedColumn>),
}

/// A single-source query as handed over by the planner.
///
/// `from` names either a live temporary table or a base group served by the
/// data manager; without a source the query produces one empty row, so
/// `SELECT 1 AS x` yields one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub from: Option<String>,
    pub projection: Projection,
    pub filter: Option<Expr>,
    pub limit: Option<usize>,
}

impl Query {
    /// `SELECT * FROM group`.
    pub fn scan(group: impl Into<String>) -> Self {
        Self {
            from: Some(group.into()),
            projection: Projection::All,
            filter: None,
            limit: None,
        }
    }

    /// `SELECT <columns>` without a FROM clause.
    pub fn values(columns: Vec<ProjectedColumn>) -> Self {
        Self {
            from: None,
            projection: Projection::Columns(columns),
            filter: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: Vec<ProjectedColumn>) -> Self {
        self.projection = Projection::Columns(columns);
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertSource {
    Values(Vec<Expr>),
    Query(Box<Query>),
}

/// Insert, update and delete statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dml {
    Insert {
        target: String,
        /// Target columns; empty means all columns in table order.
        columns: Vec<String>,
        source: InsertSource,
    },
    Update {
        target: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        target: String,
        filter: Option<Expr>,
    },
}

impl Dml {
    pub fn target(&self) -> &str {
        match self {
            Dml::Insert { target, .. } | Dml::Update { target, .. } | Dml::Delete { target, .. } => {
                target
            }
        }
    }
}

/// `EXEC procedure(args...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureCall {
    pub procedure: String,
    pub args: Vec<Expr>,
}

impl ProcedureCall {
    pub fn new(procedure: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            procedure: procedure.into(),
            args,
        }
    }
}

/// `EXECUTE STRING <sql> [AS <columns>] [INTO <temp>] [USING ...] [UPDATE <n>]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSql {
    pub sql: Expr,
    /// Declared result shape (the AS clause).
    pub columns: Option<Vec<Column>>,
    pub into: Option<String>,
    pub using: Vec<(String, Expr)>,
    /// Declared upper bound on the rows the command may update.
    pub update_count: Option<i64>,
}

impl DynamicSql {
    pub fn new(sql: Expr) -> Self {
        Self {
            sql,
            columns: None,
            into: None,
            using: Vec::new(),
            update_count: None,
        }
    }

    pub fn returning(mut self, columns: Vec<Column>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn into_table(mut self, table: impl Into<String>) -> Self {
        self.into = Some(table.into());
        self
    }

    pub fn using(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.using.push((name.into(), value));
        self
    }

    pub fn update_count(mut self, count: i64) -> Self {
        self.update_count = Some(count);
        self
    }
}

/// A sub-plan whose result feeds an instruction: the right-hand side of an
/// assignment or the source of a cursor loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Query(Query),
    Dml(Dml),
    Call(ProcedureCall),
    Dynamic(Box<DynamicSql>),
}

impl From<Query> for Command {
    fn from(query: Query) -> Self {
        Command::Query(query)
    }
}

impl From<Dml> for Command {
    fn from(dml: Dml) -> Self {
        Command::Dml(dml)
    }
}

impl From<ProcedureCall> for Command {
    fn from(call: ProcedureCall) -> Self {
        Command::Call(call)
    }
}

impl From<DynamicSql> for Command {
    fn from(dynamic: DynamicSql) -> Self {
        Command::Dynamic(Box::new(dynamic))
    }
}
