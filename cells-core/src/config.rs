//! Runtime Configuration
//!
//! Knobs that change how a [`Runtime`](crate::reactive::Runtime) schedules
//! work. Every field has a default, so a partial JSON document is enough:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "ready_order": "lifo" }"#)?;
//! let runtime = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Order in which simultaneously-ready cells are committed.
///
/// Cells with no path between them may run in either order; this only
/// picks which deterministic order is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyOrder {
    /// First ready, first committed. Ties follow the order in which cells
    /// joined the transaction.
    #[default]
    Fifo,

    /// Most recently readied cell is committed first.
    Lifo,
}

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Tie-break among ready cells during commit.
    pub ready_order: ReadyOrder,

    /// Collapse repeated reads of the same cell within one recompute into a
    /// single dependency.
    pub dedup_reads: bool,

    /// Maximum number of follow-up transactions run for resets issued while
    /// a transaction was committing.
    pub max_settle_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ready_order: ReadyOrder::Fifo,
            dedup_reads: true,
            max_settle_rounds: 64,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
