//! Reactive Primitives
//!
//! This module implements the user-facing layer: cells, the runtime that
//! commits changes to them, and the dynamic scope that ties the two
//! together.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell holds a value. A [`FormulaCell`] computes its value with a closure;
//! any cell it reads while computing becomes one of its dependencies.
//!
//! ## Transactions
//!
//! Resetting a cell marks it and everything downstream of it. Marks are
//! collected into a transaction, and when the transaction closes every
//! affected cell recomputes exactly once, inputs before outputs. Wrapping
//! several resets in [`Runtime::transaction`] makes them one batch.
//!
//! ## Dynamic scope
//!
//! [`DynVar`] carries "the read-set of the cell being recomputed" and "the
//! open transaction" through arbitrarily nested calls.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered, not declared: a cell's dependency set after
//! a recompute is exactly the set of cells whose `get` ran during that
//! recompute. A formula that reads `a` or `b` depending on a branch depends
//! only on the one it actually read.

mod cell;
mod context;
mod formula;
mod runtime;

pub use cell::{Cell, CellState};
pub use context::{Binding, DynVar};
pub use formula::FormulaCell;
pub use runtime::{Runtime, RuntimeStats};
