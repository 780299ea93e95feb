//! Cells
//!
//! A cell is an observer with a cached value. Reading a cell while another
//! cell recomputes makes the reader depend on it; recomputing a cell
//! replaces its dependencies with whatever it read this time.
//!
//! [`CellState`] holds the part every cell shares (the graph node and the
//! cached value). A concrete cell embeds one and implements [`Cell`] to say
//! how its value is produced.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Weak;

use super::runtime::Runtime;
use crate::graph::{Node, Observer};

/// Graph node plus cached value.
pub struct CellState<T> {
    node: Node,
    value: RefCell<T>,
}

impl<T> CellState<T>
where
    T: Clone + 'static,
{
    /// Create the state for a cell holding `initial`.
    ///
    /// `this` must point at the cell that embeds the state.
    pub fn new(runtime: &Runtime, this: Weak<dyn Observer>, initial: T) -> Self {
        Self {
            node: Node::new(runtime, this),
            value: RefCell::new(initial),
        }
    }

    /// The cell's graph node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Get the current value.
    ///
    /// If a cell is recomputing, this cell becomes one of its dependencies.
    pub fn get(&self) -> T {
        let runtime = self.node.runtime();
        if runtime.is_recomputing() {
            if let Some(this) = self.node.this() {
                runtime.record_read(this);
            }
        }
        self.get_untracked()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.borrow().clone()
    }

    /// Recompute the value from the old one and rediscover dependencies.
    ///
    /// `recompute` runs under a fresh read-set; afterwards the cell depends
    /// on exactly the cells it read.
    pub fn update(&self, recompute: impl FnOnce(T) -> T) {
        let old = self.get_untracked();
        let (new, reads) = self.node.runtime().collect_reads(|| recompute(old));
        let previous = self.value.replace(new);
        self.node.reset_dependencies(reads);
        drop(previous);
    }
}

impl<T> Debug for CellState<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellState")
            .field("node", &self.node)
            .field("value", &*self.value.borrow())
            .finish()
    }
}

/// An observer holding a value of type `T`.
pub trait Cell<T>: Observer
where
    T: Clone + 'static,
{
    /// The shared cell state.
    fn state(&self) -> &CellState<T>;

    /// Produce the next value from the previous one.
    fn recompute(&self, old: T) -> T;

    /// Produce a value from scratch.
    fn init(&self) -> T;

    /// Get the current value, recording a dependency if a cell is
    /// recomputing.
    fn get(&self) -> T {
        self.state().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    /// Counts how many times any of its inputs changed.
    struct ChangeCounter {
        state: CellState<u64>,
        inputs: Vec<Rc<dyn Cell<i64>>>,
    }

    impl ChangeCounter {
        fn new(runtime: &Runtime, inputs: Vec<Rc<dyn Cell<i64>>>) -> Rc<Self> {
            Rc::new_cyclic(|this: &Weak<Self>| Self {
                state: CellState::new(runtime, this.clone(), 0),
                inputs,
            })
        }
    }

    impl Cell<u64> for ChangeCounter {
        fn state(&self) -> &CellState<u64> {
            &self.state
        }

        fn recompute(&self, old: u64) -> u64 {
            for input in &self.inputs {
                input.get();
            }
            old + 1
        }

        fn init(&self) -> u64 {
            0
        }
    }

    impl Observer for ChangeCounter {
        fn node(&self) -> &Node {
            &self.state.node
        }

        fn update(&self) {
            self.state.update(|old| self.recompute(old));
        }
    }

    #[test]
    fn custom_cell_tracks_reads() {
        let runtime = Runtime::new();
        let a = runtime.cell::<i64>();
        let b = runtime.cell::<i64>();
        let inputs: Vec<Rc<dyn Cell<i64>>> = vec![
            a.clone() as Rc<dyn Cell<i64>>,
            b.clone() as Rc<dyn Cell<i64>>,
        ];
        let counter = ChangeCounter::new(&runtime, inputs);
        assert_eq!(counter.get(), 0);

        counter.node().mark().unwrap();
        assert_eq!(counter.get(), 1);
        assert_eq!(
            counter.node().dependency_ids(),
            vec![a.node().id(), b.node().id()]
        );

        a.reset_value(1).unwrap();
        b.reset_value(2).unwrap();
        assert_eq!(counter.get(), 3);

        runtime
            .transaction(|| {
                a.reset_value(10).unwrap();
                b.reset_value(20).unwrap();
            })
            .unwrap();
        assert_eq!(counter.get(), 4);
        assert_eq!(counter.init(), 0);
    }

    #[test]
    fn untracked_read_adds_no_dependency() {
        let runtime = Runtime::new();
        let a = runtime.cell::<i64>();
        let b = runtime.cell::<i64>();

        let ar = a.clone();
        b.reset(move || ar.get_untracked() + 1).unwrap();
        assert_eq!(b.get(), 1);
        assert!(b.node().dependency_ids().is_empty());

        a.reset_value(5).unwrap();
        assert_eq!(b.get(), 1);
    }
}
