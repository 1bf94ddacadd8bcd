use core::fmt;

/// A stack with an enforced maximum size.
///
/// The executor keeps its block frames here. Programs nest blocks as deep as
/// the planner lets them, so the limit is a runtime check that fails the
/// push instead of growing without bound.
///
/// # Examples
///
/// ```ignore
/// let mut stack = Stack::new(2);
/// stack.push(42)?;
/// stack.push(17)?;
/// assert!(stack.push(1).is_err());
/// assert_eq!(stack.pop(), Some(17));
/// assert_eq!(stack.peek(), Some(&42));
/// ```
pub struct Stack<T> {
    items: Vec<T>,
    max_size: usize,
}

/// Returned when a push would exceed the stack's maximum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub max_size: usize,
}

impl<T> Stack<T> {
    /// Creates a new stack with the specified maximum size.
    pub fn new(max_size: usize) -> Self {
        // Pre-allocate a little; most procedures nest only a few blocks.
        let initial_capacity = max_size.min(16);

        Self {
            items: Vec::with_capacity(initial_capacity),
            max_size,
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), Overflow> {
        if self.items.len() >= self.max_size {
            return Err(Overflow {
                max_size: self.max_size,
            });
        }
        self.items.push(value);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    #[inline]
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Distance from the top of the first element matching `predicate`,
    /// searching downwards. The top element is at offset 0.
    pub fn offset_of(&self, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        self.items.iter().rev().position(predicate)
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("len", &self.items.len())
            .field("max_size", &self.max_size)
            .field("items", &self.items)
            .finish()
    }
}
