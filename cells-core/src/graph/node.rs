//! Graph Nodes
//!
//! Every cell embeds a [`Node`], which records the cell's place in the
//! dependency graph.
//!
//! # Ownership
//!
//! Edges point both ways but only one direction owns:
//!
//! - `dependencies` hold strong references. A cell keeps alive everything it
//!   read during its last recompute.
//! - `dependents` hold weak references. A cell never keeps alive the cells
//!   that read it, so an unreferenced formula is dropped even while its
//!   inputs live on.
//!
//! A dependent that has been dropped is treated as absent. Its entry is
//! removed when it drops, and any leftover dead entry is pruned the next
//! time the dependents are walked.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::cell::RefCell;

use smallvec::SmallVec;

use crate::error::Result;
use crate::reactive::Runtime;

/// Unique identifier for an observer.
///
/// Observers are compared by identity, never by value; this is that identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A participant in the dependency graph.
///
/// Implementors embed a [`Node`] and know how to bring themselves up to date.
pub trait Observer: 'static {
    /// The graph node embedded in this observer.
    fn node(&self) -> &Node;

    /// Recompute this observer and rediscover its dependencies.
    ///
    /// Called by the runtime once per transaction, after every dependency
    /// inside the same transaction has been updated.
    fn update(&self);
}

type Dependents = SmallVec<[(ObserverId, Weak<dyn Observer>); 2]>;

/// Strong references to the observers read during one recompute.
pub type Dependencies = SmallVec<[Rc<dyn Observer>; 4]>;

/// Edge bookkeeping for one observer.
pub struct Node {
    id: ObserverId,

    /// Handle to the observer that embeds this node.
    this: Weak<dyn Observer>,

    /// The runtime whose transactions this node joins.
    runtime: Runtime,

    /// Observers that read this one during their last recompute.
    dependents: RefCell<Dependents>,

    /// Observers this one read during its last recompute.
    dependencies: RefCell<Dependencies>,
}

impl Node {
    /// Create a node with no edges.
    ///
    /// `this` must point at the observer that embeds the node; build it with
    /// [`Rc::new_cyclic`].
    pub fn new(runtime: &Runtime, this: Weak<dyn Observer>) -> Self {
        Self {
            id: ObserverId::new(),
            this,
            runtime: runtime.clone(),
            dependents: RefCell::new(SmallVec::new()),
            dependencies: RefCell::new(SmallVec::new()),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The runtime this node belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Strong handle to the embedding observer.
    ///
    /// `None` while the observer is being constructed or dropped.
    pub fn this(&self) -> Option<Rc<dyn Observer>> {
        self.this.upgrade()
    }

    /// Register `dependent` as a reader of this node.
    ///
    /// Registering the same dependent twice keeps a single entry.
    pub fn add_dependent(&self, id: ObserverId, dependent: Weak<dyn Observer>) {
        let mut dependents = self.dependents.borrow_mut();
        if !dependents.iter().any(|(existing, _)| *existing == id) {
            dependents.push((id, dependent));
        }
    }

    /// Unregister `id` as a reader of this node, dropping dead entries on
    /// the way.
    pub fn remove_dependent(&self, id: ObserverId) {
        self.dependents
            .borrow_mut()
            .retain(|(existing, weak)| *existing != id && weak.strong_count() > 0);
    }

    /// Replace this node's dependencies with `dependencies`.
    ///
    /// The new set is installed in one swap before the reverse edges are
    /// touched, so the forward edges are never observed half-replaced.
    pub fn reset_dependencies(&self, dependencies: Dependencies) {
        let old = self.dependencies.replace(dependencies);
        for dependency in &old {
            dependency.node().remove_dependent(self.id);
        }

        for dependency in self.dependencies.borrow().iter() {
            dependency.node().add_dependent(self.id, self.this.clone());
        }
    }

    /// IDs of the observers read during the last recompute, in first-read
    /// order.
    pub fn dependency_ids(&self) -> Vec<ObserverId> {
        self.dependencies
            .borrow()
            .iter()
            .map(|dependency| dependency.node().id())
            .collect()
    }

    /// IDs of the dependents that are still alive.
    pub fn dependent_ids(&self) -> Vec<ObserverId> {
        self.dependents
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of stored dependent entries, dead or alive.
    pub fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }

    /// Snapshot of the live dependents. Dead entries are pruned.
    fn live_dependents(&self) -> Vec<Rc<dyn Observer>> {
        let mut live = Vec::new();
        self.dependents.borrow_mut().retain(|(_, weak)| match weak.upgrade() {
            Some(dependent) => {
                live.push(dependent);
                true
            }
            None => false,
        });
        live
    }

    /// Schedule this node, and transitively every dependent, for update.
    ///
    /// Outside a transaction this opens one, marks the node inside it and
    /// commits on the way out, so errors from the commit surface here.
    /// Inside a transaction the node joins it and records a
    /// "runs before" edge to each dependent.
    ///
    /// The walk keeps its own stack, so chain length is not limited by the
    /// thread's stack size.
    pub fn mark(&self) -> Result<()> {
        if !self.runtime.in_transaction() {
            return self.runtime.transaction(|| self.mark())?;
        }

        let Some(this) = self.this() else {
            return Ok(());
        };
        if !self.runtime.enlist(this) {
            return Ok(());
        }

        let mut pending: Vec<(ObserverId, Rc<dyn Observer>)> = Vec::new();
        self.push_dependents(&mut pending);

        while let Some((parent, dependent)) = pending.pop() {
            let node = dependent.node();
            if self.runtime.enlist(Rc::clone(&dependent)) {
                node.push_dependents(&mut pending);
            }
            // Ignored unless both ends are in the transaction.
            self.runtime.precede(parent, node.id());
        }
        Ok(())
    }

    /// Queue the live dependents, first-registered on top.
    fn push_dependents(&self, pending: &mut Vec<(ObserverId, Rc<dyn Observer>)>) {
        let dependents = self.live_dependents();
        pending.extend(dependents.into_iter().rev().map(|dependent| (self.id, dependent)));
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut released: Vec<Rc<dyn Observer>> = Vec::new();
        for dependency in self.dependencies.get_mut().drain(..) {
            dependency.node().remove_dependent(self.id);
            released.push(dependency);
        }

        // A dependency held only by `released` dies when popped. Hoist its
        // own dependencies first so a long chain unwinds here instead of
        // through nested drops.
        while let Some(dependency) = released.pop() {
            if Rc::strong_count(&dependency) == 1 {
                let node = dependency.node();
                let orphaned = node.dependencies.take();
                for inner in orphaned {
                    inner.node().remove_dependent(node.id);
                    released.push(inner);
                }
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("dependencies", &self.dependency_ids())
            .field("dependents", &self.dependent_ids())
            .finish()
    }
}
