//! Lexical scope stack for procedure variables.
//!
//! Every block, loop iteration and procedure body pushes a frame; the frame
//! is popped when control leaves it. Lookups walk from the innermost frame
//! outwards, so an inner declaration shadows an outer one for the lifetime of
//! its frame:
//! ```text
//! DECLARE integer x = 1;
//! LOOP ON (SELECT 2 AS x) AS c BEGIN
//!     DECLARE integer x = 3;   -- shadows the outer x inside the loop
//! END
//! ```
//! Names are case-insensitive.

use core::fmt;

use hashbrown::HashMap;

/// One frame of bindings.
#[derive(Debug, Clone)]
pub struct Frame<T> {
    bindings: HashMap<String, T>,
}

impl<T> Frame<T> {
    fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }
}

/// A stack of frames searched from innermost to outermost.
#[derive(Debug, Clone)]
pub struct ScopeStack<T> {
    frames: Vec<Frame<T>>,
}

impl<T> Default for ScopeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScopeStack<T> {
    /// Create a new empty scope stack.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pop the innermost frame, dropping its bindings.
    pub fn pop_frame(&mut self) -> Result<Frame<T>, PopError> {
        self.frames.pop().ok_or(PopError::EmptyStack)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Bind a new name in the innermost frame.
    ///
    /// Declaring a name twice in the same frame is an error; declaring a name
    /// that an outer frame already binds shadows it.
    pub fn declare(&mut self, name: &str, value: T) -> Result<(), BindError> {
        let frame = self.frames.last_mut().ok_or(BindError::NoScope)?;
        let key = key(name);
        if frame.bindings.contains_key(&key) {
            return Err(BindError::AlreadyBound(name.to_string()));
        }
        frame.bindings.insert(key, value);
        Ok(())
    }

    /// Look up a name, searching frames from innermost to outermost.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        let key = key(name);
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.get(&key))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        let key = key(name);
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.bindings.get_mut(&key))
    }

    /// Write to the nearest frame that binds `name`, or bind it in the
    /// innermost frame when no frame does.
    pub fn set(&mut self, name: &str, value: T) -> Result<(), BindError> {
        if let Some(slot) = self.lookup_mut(name) {
            *slot = value;
            return Ok(());
        }
        let frame = self.frames.last_mut().ok_or(BindError::NoScope)?;
        frame.bindings.insert(key(name), value);
        Ok(())
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Error when trying to bind a value in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// No frame exists to bind in.
    NoScope,
    /// The name has already been bound in the current frame.
    AlreadyBound(String),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::NoScope => write!(f, "No scope to bind in"),
            BindError::AlreadyBound(name) => {
                write!(f, "Name '{}' already bound in current scope", name)
            }
        }
    }
}

impl std::error::Error for BindError {}

/// Error when trying to pop a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopError {
    /// The stack is empty.
    EmptyStack,
}

impl fmt::Display for PopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopError::EmptyStack => write!(f, "Cannot pop from empty scope stack"),
        }
    }
}

impl std::error::Error for PopError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut stack = ScopeStack::new();
        stack.push_frame();
        stack.declare("a", 1).unwrap();
        stack.push_frame();
        stack.declare("b", 2).unwrap();

        assert_eq!(stack.lookup("a"), Some(&1));
        assert_eq!(stack.lookup("B"), Some(&2));
        assert_eq!(stack.lookup("c"), None);
    }

    #[test]
    fn test_shadowing() {
        let mut stack = ScopeStack::new();
        stack.push_frame();
        stack.declare("a", 1).unwrap();
        stack.push_frame();
        stack.declare("a", 10).unwrap();

        assert_eq!(stack.lookup("a"), Some(&10));

        stack.pop_frame().unwrap();

        // Original 'a' is visible again
        assert_eq!(stack.lookup("a"), Some(&1));
    }

    #[test]
    fn test_declare_twice_in_frame_error() {
        let mut stack = ScopeStack::new();
        stack.push_frame();
        stack.declare("a", 1).unwrap();

        let result = stack.declare("A", 2);
        assert!(matches!(result, Err(BindError::AlreadyBound(_))));
    }

    #[test]
    fn test_set_targets_declaring_frame() {
        let mut stack = ScopeStack::new();
        stack.push_frame();
        stack.declare("total", 0).unwrap();
        stack.push_frame();

        stack.set("total", 5).unwrap();
        stack.pop_frame().unwrap();

        assert_eq!(stack.lookup("total"), Some(&5));
    }

    #[test]
    fn test_set_undeclared_binds_innermost() {
        let mut stack = ScopeStack::new();
        stack.push_frame();
        stack.push_frame();

        stack.set("x", 7).unwrap();
        assert_eq!(stack.lookup("x"), Some(&7));

        stack.pop_frame().unwrap();
        assert_eq!(stack.lookup("x"), None);
    }

    #[test]
    fn test_bind_without_frame_error() {
        let mut stack: ScopeStack<i32> = ScopeStack::new();
        assert_eq!(stack.declare("a", 1), Err(BindError::NoScope));
        assert!(matches!(stack.pop_frame(), Err(PopError::EmptyStack)));
    }
}
