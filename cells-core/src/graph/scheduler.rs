//! Transactions
//!
//! A [`Transaction`] collects the cells affected by one logical change and
//! commits them in dependency order.
//!
//! # Algorithm
//!
//! 1. While the transaction is being built, every marked cell gets a DAG node
//!    and every "A must run before B" constraint between two marked cells
//!    becomes an edge. The result is a local snapshot of the slice of the
//!    dependency graph that the change can reach.
//! 2. When the transaction closes, Kahn's algorithm orders the snapshot:
//!    start from the nodes with no incoming edges, repeatedly take a ready
//!    node and release the nodes it points at.
//! 3. If the ready set runs dry before every node was taken, the snapshot
//!    has a cycle and nothing is committed.
//!
//! Nodes are kept in an `IndexMap`, so ties between ready nodes are broken
//! the same way every run.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::node::{Observer, ObserverId};
use crate::config::ReadyOrder;
use crate::error::{CellError, Result};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Cells are still being marked.
    Building,

    /// The commit order is fixed and updates are running. Cells marked now
    /// are deferred to a follow-up transaction.
    Committing,
}

/// Outcome of adding a cell to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enlisted {
    /// The cell joined the transaction.
    Added,

    /// The cell was already part of the transaction.
    Present,

    /// The transaction is committing; the cell waits for the next round.
    Deferred,
}

/// One affected cell plus its ordering constraints within the transaction.
struct DagNode {
    observer: Rc<dyn Observer>,

    /// Nodes that must be updated before this one.
    incoming: IndexSet<ObserverId>,

    /// Nodes that must be updated after this one.
    outgoing: IndexSet<ObserverId>,
}

/// The induced subgraph of cells affected by one batch of changes.
pub struct Transaction {
    dag: IndexMap<ObserverId, DagNode>,
    phase: Phase,
    deferred: IndexMap<ObserverId, Rc<dyn Observer>>,
}

impl Transaction {
    /// Create an empty transaction in the building phase.
    pub fn new() -> Self {
        Self {
            dag: IndexMap::new(),
            phase: Phase::Building,
            deferred: IndexMap::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of affected cells.
    pub fn len(&self) -> usize {
        self.dag.len()
    }

    /// Check if no cell has been marked.
    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Check if the cell with the given ID is part of the transaction.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.dag.contains_key(&id)
    }

    /// Add a cell to the transaction.
    pub fn enlist(&mut self, observer: Rc<dyn Observer>) -> Enlisted {
        let id = observer.node().id();
        match self.phase {
            Phase::Committing => {
                self.deferred.entry(id).or_insert(observer);
                Enlisted::Deferred
            }
            Phase::Building if self.dag.contains_key(&id) => Enlisted::Present,
            Phase::Building => {
                self.dag.insert(
                    id,
                    DagNode {
                        observer,
                        incoming: IndexSet::new(),
                        outgoing: IndexSet::new(),
                    },
                );
                Enlisted::Added
            }
        }
    }

    /// Record that `before` must be updated before `after`.
    ///
    /// Both cells must already be part of the transaction; otherwise the
    /// constraint is ignored.
    pub fn precede(&mut self, before: ObserverId, after: ObserverId) {
        if !(self.dag.contains_key(&before) && self.dag.contains_key(&after)) {
            return;
        }
        if let Some(node) = self.dag.get_mut(&before) {
            node.outgoing.insert(after);
        }
        if let Some(node) = self.dag.get_mut(&after) {
            node.incoming.insert(before);
        }
    }

    /// Stop accepting new cells and compute the commit order.
    ///
    /// Consumes the edge bookkeeping: dependencies come strictly before
    /// dependents in the returned order. Fails with [`CellError::Cycle`] if
    /// the affected cells cannot be ordered.
    pub fn commit_order(&mut self, ready_order: ReadyOrder) -> Result<Vec<Rc<dyn Observer>>> {
        self.phase = Phase::Committing;

        let mut ready: VecDeque<ObserverId> = self
            .dag
            .iter()
            .filter(|(_, node)| node.incoming.is_empty())
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.dag.len());

        loop {
            let next = match ready_order {
                ReadyOrder::Fifo => ready.pop_front(),
                ReadyOrder::Lifo => ready.pop_back(),
            };
            let Some(id) = next else { break };
            let Some(node) = self.dag.get_mut(&id) else { continue };

            order.push(Rc::clone(&node.observer));
            let outgoing = std::mem::take(&mut node.outgoing);

            for other_id in outgoing {
                if let Some(other) = self.dag.get_mut(&other_id) {
                    other.incoming.shift_remove(&id);
                    if other.incoming.is_empty() {
                        ready.push_back(other_id);
                    }
                }
            }
        }

        if order.len() != self.dag.len() {
            let cells: Vec<ObserverId> = self
                .dag
                .iter()
                .filter(|(_, node)| !node.incoming.is_empty())
                .map(|(id, _)| *id)
                .collect();
            return Err(CellError::Cycle {
                affected: self.dag.len(),
                unresolved: cells.len(),
                cells,
            });
        }

        Ok(order)
    }

    /// Take the cells marked while the transaction was committing.
    pub fn take_deferred(&mut self) -> Vec<Rc<dyn Observer>> {
        std::mem::take(&mut self.deferred).into_values().collect()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("phase", &self.phase)
            .field("affected", &self.dag.keys().collect::<Vec<_>>())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::reactive::Runtime;
    use std::rc::Weak;

    struct Inert {
        node: Node,
    }

    impl Observer for Inert {
        fn node(&self) -> &Node {
            &self.node
        }

        fn update(&self) {}
    }

    fn inert(runtime: &Runtime) -> Rc<dyn Observer> {
        Rc::new_cyclic(|this: &Weak<Inert>| Inert {
            node: Node::new(runtime, this.clone()),
        })
    }

    fn ids(order: &[Rc<dyn Observer>]) -> Vec<ObserverId> {
        order.iter().map(|o| o.node().id()).collect()
    }

    #[test]
    fn enlist_reports_membership() {
        let runtime = Runtime::new();
        let a = inert(&runtime);
        let mut tx = Transaction::new();

        assert_eq!(tx.enlist(Rc::clone(&a)), Enlisted::Added);
        assert_eq!(tx.enlist(Rc::clone(&a)), Enlisted::Present);
        assert!(tx.contains(a.node().id()));
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn diamond_is_ordered() {
        let runtime = Runtime::new();
        let [x0, x1, x2, y] = [(); 4].map(|_| inert(&runtime));
        let mut tx = Transaction::new();
        // Enlist out of dependency order on purpose.
        for cell in [&y, &x2, &x1, &x0] {
            tx.enlist(Rc::clone(cell));
        }
        let id = |c: &Rc<dyn Observer>| c.node().id();
        tx.precede(id(&x0), id(&x1));
        tx.precede(id(&x0), id(&x2));
        tx.precede(id(&x1), id(&y));
        tx.precede(id(&x2), id(&y));

        let order = ids(&tx.commit_order(ReadyOrder::Fifo).unwrap());
        let pos = |c: &Rc<dyn Observer>| order.iter().position(|i| *i == id(c)).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos(&x0) < pos(&x1));
        assert!(pos(&x0) < pos(&x2));
        assert!(pos(&x1) < pos(&y));
        assert!(pos(&x2) < pos(&y));
        assert_eq!(tx.phase(), Phase::Committing);
    }

    #[test]
    fn ready_order_breaks_ties_deterministically() {
        let runtime = Runtime::new();
        let cells: Vec<_> = (0..3).map(|_| inert(&runtime)).collect();
        let expected = ids(&cells);

        let mut fifo = Transaction::new();
        let mut lifo = Transaction::new();
        for cell in &cells {
            fifo.enlist(Rc::clone(cell));
            lifo.enlist(Rc::clone(cell));
        }

        assert_eq!(ids(&fifo.commit_order(ReadyOrder::Fifo).unwrap()), expected);
        let mut reversed = expected.clone();
        reversed.reverse();
        assert_eq!(ids(&lifo.commit_order(ReadyOrder::Lifo).unwrap()), reversed);
    }

    #[test]
    fn cycle_is_reported() {
        let runtime = Runtime::new();
        let [a, b, c] = [(); 3].map(|_| inert(&runtime));
        let mut tx = Transaction::new();
        for cell in [&a, &b, &c] {
            tx.enlist(Rc::clone(cell));
        }
        let (a, b, c) = (a.node().id(), b.node().id(), c.node().id());
        tx.precede(a, b);
        tx.precede(b, c);
        tx.precede(c, b);

        match tx.commit_order(ReadyOrder::Fifo) {
            Err(CellError::Cycle {
                affected,
                unresolved,
                cells,
            }) => {
                assert_eq!(affected, 3);
                assert_eq!(unresolved, 2);
                assert_eq!(cells, vec![b, c]);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let runtime = Runtime::new();
        let a = inert(&runtime);
        let mut tx = Transaction::new();
        tx.enlist(Rc::clone(&a));
        tx.precede(a.node().id(), a.node().id());

        assert!(tx.commit_order(ReadyOrder::Fifo).err().unwrap().is_cycle());
    }

    #[test]
    fn marks_while_committing_are_deferred() {
        let runtime = Runtime::new();
        let a = inert(&runtime);
        let b = inert(&runtime);
        let mut tx = Transaction::new();
        tx.enlist(Rc::clone(&a));
        tx.commit_order(ReadyOrder::Fifo).unwrap();

        assert_eq!(tx.enlist(Rc::clone(&b)), Enlisted::Deferred);
        assert_eq!(tx.enlist(Rc::clone(&b)), Enlisted::Deferred);
        assert!(!tx.contains(b.node().id()));

        let deferred = tx.take_deferred();
        assert_eq!(ids(&deferred), vec![b.node().id()]);
        assert!(tx.take_deferred().is_empty());
    }
}
