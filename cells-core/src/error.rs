//! Error types for cells-core.

use thiserror::Error;

use crate::graph::ObserverId;

/// Result type for cell operations.
pub type Result<T> = std::result::Result<T, CellError>;

/// Errors that can occur while committing transactions or configuring a runtime.
#[derive(Debug, Error)]
pub enum CellError {
    /// The affected subgraph of a transaction contains a cycle.
    ///
    /// No update from the transaction was applied.
    #[error("cell cycle detected: {unresolved} of {affected} affected cells could not be ordered")]
    Cycle {
        /// Number of cells in the transaction.
        affected: usize,
        /// Number of cells left with unresolved predecessors.
        unresolved: usize,
        /// The unresolved cells, in the order they joined the transaction.
        cells: Vec<ObserverId>,
    },

    /// Resets issued from inside recompute closures kept scheduling
    /// follow-up transactions.
    #[error("cells did not settle after {rounds} follow-up transactions")]
    Unsettled { rounds: usize },

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl CellError {
    /// Whether this error reports a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, CellError::Cycle { .. })
    }
}
