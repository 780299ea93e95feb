//! Cells Core
//!
//! This crate provides a self-adjusting computation engine: a graph of typed
//! value cells where some cells are formulas over others. Changing an input
//! recomputes exactly the cells that depend on it, each once, inputs before
//! outputs, inside one atomic transaction.
//!
//! It implements:
//!
//! - Dynamic dependency discovery (cells read during a recompute become its
//!   dependencies)
//! - Transactional, topologically ordered commits with cycle detection
//! - A dynamic-scope primitive for ambient per-graph context
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Observer nodes, edge bookkeeping, and transactions
//! - `reactive`: Cells, formula cells, the runtime, and dynamic scope
//! - `config`: Runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use cells_core::Runtime;
//!
//! let runtime = Runtime::new();
//! let x0 = runtime.cell::<f64>();
//! let x1 = runtime.cell::<f64>();
//!
//! runtime.transaction(|| -> cells_core::Result<()> {
//!     x0.reset_value(10.0)?;
//!     let x = Rc::clone(&x0);
//!     x1.reset(move || x.get() + 5.0)?;
//!     Ok(())
//! })??;
//! assert_eq!(x1.get(), 15.0);
//!
//! // One transaction, x1 recomputed once
//! x0.reset_value(-20.0)?;
//! assert_eq!(x1.get(), -15.0);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{ReadyOrder, RuntimeConfig};
pub use error::{CellError, Result};
pub use graph::{Observer, ObserverId};
pub use reactive::{Cell, FormulaCell, Runtime, RuntimeStats};
