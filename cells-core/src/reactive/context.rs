//! Dynamic Scope
//!
//! A [`DynVar`] is a rebindable variable with stack discipline. Binding a
//! value makes it current for the duration of a scope; leaving the scope
//! restores whatever was current before, including when the scope is left
//! by unwinding.
//!
//! The runtime uses two of these: one holding the read-set of the cell that
//! is currently recomputing, one holding the open transaction. Together they
//! let deeply nested calls (a formula reading a cell, a reset marking its
//! dependents) reach the ambient context without passing it around.
//!
//! # Implementation
//!
//! The stack is a `RefCell<Vec<T>>`, so a `DynVar` is confined to the thread
//! that owns it. For a per-thread ambient value, put one in a `thread_local!`:
//!
//! ```rust,ignore
//! thread_local! {
//!     static GREETEE: DynVar<String> = const { DynVar::new() };
//! }
//!
//! GREETEE.with(|g| g.with("geek".to_string(), || greet()));
//! ```

use std::cell::RefCell;
use std::fmt;

/// A stack-scoped rebindable variable.
pub struct DynVar<T> {
    stack: RefCell<Vec<T>>,
}

impl<T> DynVar<T> {
    /// Create an unbound variable.
    pub const fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Make `value` the current binding, remembering the previous one.
    pub fn push(&self, value: T) {
        self.stack.borrow_mut().push(value);
    }

    /// Restore the previous binding, returning the one that was current.
    pub fn pop(&self) -> Option<T> {
        self.stack.borrow_mut().pop()
    }

    /// Replace the innermost binding, or install one if the variable is
    /// unbound.
    pub fn set(&self, value: T) {
        let mut stack = self.stack.borrow_mut();
        stack.pop();
        stack.push(value);
    }

    /// Check whether the variable currently has a binding.
    pub fn is_bound(&self) -> bool {
        !self.stack.borrow().is_empty()
    }

    /// Number of nested bindings.
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Run `f` on the current binding, if there is one.
    ///
    /// The variable is borrowed while `f` runs; `f` must not touch this
    /// same variable.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.stack.borrow_mut().last_mut().map(f)
    }

    /// Bind `value` until the returned guard is dropped.
    pub fn bind(&self, value: T) -> Binding<'_, T> {
        self.push(value);
        Binding {
            var: self,
            depth: self.depth(),
            active: true,
        }
    }

    /// Run `f` with `value` bound for exactly the duration of the call.
    pub fn with<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let _binding = self.bind(value);
        f()
    }
}

impl<T: Clone> DynVar<T> {
    /// Clone of the current binding, if any.
    pub fn get(&self) -> Option<T> {
        self.stack.borrow().last().cloned()
    }
}

impl<T> Default for DynVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DynVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynVar")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Guard that pops a binding when dropped.
///
/// This keeps the stack balanced even if the bound scope panics.
#[must_use = "dropping a binding immediately restores the previous value"]
pub struct Binding<'a, T> {
    var: &'a DynVar<T>,
    depth: usize,
    active: bool,
}

impl<T> Binding<'_, T> {
    /// Pop the binding now and hand back the bound value, with whatever
    /// changes were made to it while it was current.
    ///
    /// Returns `None` if the value was already popped through
    /// [`DynVar::pop`].
    pub fn finish(mut self) -> Option<T> {
        self.active = false;
        self.release()
    }

    fn release(&self) -> Option<T> {
        debug_assert_eq!(
            self.var.depth(),
            self.depth,
            "DynVar binding mismatch: bindings must be released in reverse order"
        );
        self.var.pop()
    }
}

impl<T> Drop for Binding<'_, T> {
    fn drop(&mut self) {
        if self.active {
            self.release();
        }
    }
}
