//! The compiled procedure tree.
//!
//! A [`Program`] is what the external planner hands to the engine: a typed,
//! fully resolved tree of instructions. It is immutable and shared through an
//! `Arc`, so any number of executions can run the same program at once.

mod command;
mod expr;
mod instruction;

use core::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use command::{
    Command, Dml, DynamicSql, InsertSource, ProcedureCall, ProjectedColumn, Projection, Query,
};
pub use expr::{BinaryOp, BoolOp, CompareOp, Expr};
pub use instruction::{Assignment, Instruction};

use crate::errors::ProcedureError;
use crate::values::{Column, DataType};

/// A sequence of instructions executed in order.
///
/// Cloning a block only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block(Arc<[Instruction]>);

impl Block {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Block(instructions.into())
    }

    pub fn empty() -> Self {
        Block(Arc::from([]))
    }
}

impl Deref for Block {
    type Target = [Instruction];

    fn deref(&self) -> &[Instruction] {
        &self.0
    }
}

impl From<Vec<Instruction>> for Block {
    fn from(instructions: Vec<Instruction>) -> Self {
        Block::new(instructions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureKind {
    /// Returns the rows of its last result-producing statement.
    Virtual,
    /// Returns a single row holding `ROWS_UPDATED` unless a statement
    /// produced a result.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: DataType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A compiled procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub kind: ProcedureKind,
    pub result_columns: Vec<Column>,
    /// Declared upper bound on the source rows one execution may update.
    pub update_count: Option<i64>,
    pub body: Block,
}

impl Program {
    pub fn new(name: impl Into<String>, kind: ProcedureKind, body: impl Into<Block>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            kind,
            result_columns: Vec::new(),
            update_count: None,
            body: body.into(),
        }
    }

    pub fn virtual_procedure(name: impl Into<String>, body: impl Into<Block>) -> Self {
        Self::new(name, ProcedureKind::Virtual, body)
    }

    pub fn update_procedure(name: impl Into<String>, body: impl Into<Block>) -> Self {
        Self::new(name, ProcedureKind::Update, body)
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_result_columns(mut self, columns: Vec<Column>) -> Self {
        self.result_columns = columns;
        self
    }

    pub fn with_update_count(mut self, count: i64) -> Self {
        self.update_count = Some(count);
        self
    }

    /// Check structural rules the planner is expected to uphold.
    ///
    /// `BREAK` and `CONTINUE` must appear inside a `WHILE` or `LOOP` body.
    pub fn validate(&self) -> Result<(), ProcedureError> {
        validate_block(&self.name, &self.body, false)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

fn validate_block(procedure: &str, block: &Block, in_loop: bool) -> Result<(), ProcedureError> {
    for instruction in block.iter() {
        match instruction {
            Instruction::Break | Instruction::Continue if !in_loop => {
                return Err(ProcedureError::InvalidProgram {
                    message: format!(
                        "{} outside of a loop in procedure {}",
                        instruction.name().to_uppercase(),
                        procedure
                    ),
                });
            }
            Instruction::If {
                then, otherwise, ..
            } => {
                validate_block(procedure, then, in_loop)?;
                if let Some(otherwise) = otherwise {
                    validate_block(procedure, otherwise, in_loop)?;
                }
            }
            Instruction::While { body, .. } | Instruction::Loop { body, .. } => {
                validate_block(procedure, body, true)?;
            }
            Instruction::Block(block) => validate_block(procedure, block, in_loop)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let program = Program::virtual_procedure(
            "p",
            vec![Instruction::if_then(
                Expr::constant(true),
                vec![Instruction::Break],
                None,
            )],
        );
        assert!(matches!(
            program.validate(),
            Err(ProcedureError::InvalidProgram { .. })
        ));
    }

    #[test]
    fn test_break_inside_nested_loop_block() {
        let program = Program::virtual_procedure(
            "p",
            vec![Instruction::while_loop(
                Expr::constant(true),
                vec![Instruction::Block(Block::new(vec![Instruction::Break]))],
            )],
        );
        assert!(program.validate().is_ok());
    }

    #[test]
    fn test_block_clone_shares_instructions() {
        let block = Block::new(vec![Instruction::Break, Instruction::Continue]);
        let copy = block.clone();
        assert!(core::ptr::eq(block.as_ptr(), copy.as_ptr()));
        assert_eq!(copy.len(), 2);
    }
}
