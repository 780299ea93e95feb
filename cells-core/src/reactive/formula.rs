//! Formula Cells
//!
//! A [`FormulaCell`] computes its value with a user-supplied closure. It can
//! be reset three ways:
//!
//! - [`reset_value`](FormulaCell::reset_value): hold a constant;
//! - [`reset`](FormulaCell::reset): recompute from scratch with a formula;
//! - [`reset_incremental`](FormulaCell::reset_incremental): a formula for
//!   the first run plus a step closure that derives the next value from the
//!   previous one.
//!
//! Resetting never computes anything on the spot. It marks the cell, and the
//! new value appears when the enclosing transaction commits (immediately, if
//! there is no enclosing transaction).
//!
//! # Example
//!
//! ```rust,ignore
//! let runtime = Runtime::new();
//! let x = runtime.cell::<f64>();
//! let doubled = runtime.cell::<f64>();
//!
//! x.reset_value(10.0)?;
//! let xr = x.clone();
//! doubled.reset(move || xr.get() * 2.0)?;
//! assert_eq!(doubled.get(), 20.0);
//!
//! x.reset_value(-1.0)?;
//! assert_eq!(doubled.get(), -2.0);
//! ```

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::cell::{Cell, CellState};
use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::{Node, Observer};

/// The pair of closures a formula cell evaluates.
struct Formula<T> {
    /// Computes the value ignoring the previous one.
    fresh: Rc<dyn Fn() -> T>,

    /// Computes the value from the previous one.
    step: Rc<dyn Fn(T) -> T>,
}

impl<T> Formula<T>
where
    T: Clone + 'static,
{
    fn constant(value: T) -> Self {
        let step_value = value.clone();
        Self {
            fresh: Rc::new(move || value.clone()),
            step: Rc::new(move |_: T| step_value.clone()),
        }
    }

    fn fresh(formula: Rc<dyn Fn() -> T>) -> Self {
        let step_formula = Rc::clone(&formula);
        Self {
            fresh: formula,
            step: Rc::new(move |_: T| step_formula()),
        }
    }
}

/// A cell whose value is produced by a closure.
///
/// Handles are `Rc<FormulaCell<T>>`. Formulas typically capture handles to
/// the cells they read; other cells only hold this one weakly, so it lives
/// as long as the caller (or a downstream formula) keeps a handle.
pub struct FormulaCell<T>
where
    T: Clone + 'static,
{
    // Must drop before `state`: captured handles go first, leaving the
    // node's dependency list as the last owner it unwinds.
    formula: RefCell<Formula<T>>,
    state: CellState<T>,
}

impl<T> FormulaCell<T>
where
    T: Clone + 'static,
{
    /// Create a cell holding `T::default()`.
    pub fn new(runtime: &Runtime) -> Rc<Self>
    where
        T: Default,
    {
        Self::with_initial(runtime, T::default())
    }

    /// Create a cell holding `initial`.
    ///
    /// The cell is not scheduled; until it is reset, updating it keeps
    /// `initial`.
    pub fn with_initial(runtime: &Runtime, initial: T) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| Self {
            formula: RefCell::new(Formula::constant(initial.clone())),
            state: CellState::new(runtime, this.clone(), initial),
        })
    }

    /// Hold `value` from the next commit on.
    pub fn reset_value(&self, value: T) -> Result<()> {
        self.install(Formula::constant(value))
    }

    /// Recompute with `formula` from the next commit on.
    pub fn reset<F>(&self, formula: F) -> Result<()>
    where
        F: Fn() -> T + 'static,
    {
        self.install(Formula::fresh(Rc::new(formula)))
    }

    /// Recompute with `formula` the first time and with `step`, fed the
    /// previous value, afterwards.
    ///
    /// Every commit after this one runs `step`; `formula` is what
    /// [`Cell::init`] evaluates.
    pub fn reset_incremental<F, S>(&self, formula: F, step: S) -> Result<()>
    where
        F: Fn() -> T + 'static,
        S: Fn(T) -> T + 'static,
    {
        self.install(Formula {
            fresh: Rc::new(formula),
            step: Rc::new(step),
        })
    }

    /// Schedule a recompute without changing the formula.
    pub fn mark(&self) -> Result<()> {
        self.state.node().mark()
    }

    /// Get the current value.
    ///
    /// If a cell is recomputing, this cell becomes one of its dependencies.
    pub fn get(&self) -> T {
        self.state.get()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.state.get_untracked()
    }

    fn install(&self, formula: Formula<T>) -> Result<()> {
        let previous = self.formula.replace(formula);
        drop(previous);
        self.mark()
    }
}

impl<T> Cell<T> for FormulaCell<T>
where
    T: Clone + 'static,
{
    fn state(&self) -> &CellState<T> {
        &self.state
    }

    fn recompute(&self, old: T) -> T {
        let step = Rc::clone(&self.formula.borrow().step);
        step(old)
    }

    fn init(&self) -> T {
        let fresh = Rc::clone(&self.formula.borrow().fresh);
        fresh()
    }
}

impl<T> Observer for FormulaCell<T>
where
    T: Clone + 'static,
{
    fn node(&self) -> &Node {
        self.state.node()
    }

    fn update(&self) {
        self.state.update(|old| self.recompute(old));
    }
}

impl<T> Debug for FormulaCell<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaCell")
            .field("id", &self.state.node().id())
            .field("value", &self.get_untracked())
            .field("dependencies", &self.state.node().dependency_ids())
            .finish()
    }
}
