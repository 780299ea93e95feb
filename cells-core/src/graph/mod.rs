//! Dependency Graph
//!
//! This module implements the graph that connects cells and the transactions
//! that commit changes to it.
//!
//! # Overview
//!
//! - Nodes are cells. Each cell embeds a [`Node`] holding its edges.
//! - If B read A during its last recompute, A lists B as a dependent and B
//!   lists A as a dependency.
//!
//! Edges are not declared; a cell's dependencies are exactly the cells it
//! read the last time it recomputed, and they are rediscovered on every
//! recompute.
//!
//! # Design Decisions
//!
//! 1. The graph is distributed: every node owns its own edge lists. There is
//!    no central registry, so dropping the last handle to a cell removes it
//!    from the graph.
//!
//! 2. Dependencies are strong and dependents are weak, so ownership always
//!    flows from downstream to upstream.
//!
//! 3. Ordering is computed per transaction over the affected slice only,
//!    never over the whole graph.

mod node;
mod scheduler;

pub use node::{Dependencies, Node, Observer, ObserverId};
pub use scheduler::{Enlisted, Phase, Transaction};
