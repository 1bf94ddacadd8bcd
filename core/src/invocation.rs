//! Procedure lookup, argument binding and recursion detection.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::casting::convert_implicit;
use crate::errors::ProcedureError;
use crate::program::Program;
use crate::values::Value;

/// Resolves procedure names to compiled programs.
pub trait ProcedureCatalog: Send + Sync {
    fn procedure(&self, name: &str) -> Option<Arc<Program>>;
}

/// A catalog backed by a map, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MapCatalog {
    procedures: HashMap<String, Arc<Program>>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a program under its own name, replacing any previous one.
    pub fn register(&mut self, program: Program) -> Arc<Program> {
        let program = Arc::new(program);
        self.procedures
            .insert(program.name.to_ascii_lowercase(), Arc::clone(&program));
        program
    }

    pub fn with(mut self, program: Program) -> Self {
        self.register(program);
        self
    }
}

impl ProcedureCatalog for MapCatalog {
    fn procedure(&self, name: &str) -> Option<Arc<Program>> {
        self.procedures.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Names of the procedures currently executing, outermost first.
///
/// Each execution owns its chain; a callee receives a copy extended with its
/// own name, so leaving a procedure (normally or through an error) drops its
/// entry with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationChain {
    names: Vec<String>,
}

impl InvocationChain {
    pub fn root(procedure: &str) -> Self {
        Self::default().extended(procedure)
    }

    /// The chain seen by a callee. Anonymous programs are not recorded.
    pub fn extended(&self, procedure: &str) -> Self {
        let mut names = self.names.clone();
        if !procedure.is_empty() {
            names.push(procedure.to_string());
        }
        Self { names }
    }

    fn contains(&self, procedure: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(procedure))
    }

    /// Fail with a recursion error if `procedure` is already executing.
    pub fn check(&self, procedure: &str) -> Result<(), ProcedureError> {
        if self.contains(procedure) {
            return Err(ProcedureError::Recursion {
                procedure: procedure.to_string(),
                chain: self.names.join(" -> "),
            });
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.names.len()
    }
}

/// Check the argument count and convert arguments to the parameter types.
pub fn bind_arguments(program: &Program, args: Vec<Value>) -> Result<Vec<Value>, ProcedureError> {
    if args.len() != program.parameters.len() {
        return Err(ProcedureError::ArgumentCount {
            name: program.name.clone(),
            expected: program.parameters.len(),
            actual: args.len(),
        });
    }
    args.into_iter()
        .zip(&program.parameters)
        .map(|(value, parameter)| {
            convert_implicit(value, parameter.ty).map_err(ProcedureError::from)
        })
        .collect()
}
