//! Reactive Runtime
//!
//! The runtime is the ambient context shared by every cell of one graph. It
//! owns the two dynamic variables that cells reach without them being passed
//! around:
//!
//! - the read-set of the cell currently recomputing, which [`Cell::get`]
//!   appends to;
//! - the open [`Transaction`], which marking appends to.
//!
//! # How It Works
//!
//! 1. A reset marks its cell. With no transaction open, the mark opens one
//!    and commits it before returning.
//!
//! 2. Marking adds the cell and, transitively, all of its live dependents to
//!    the transaction, recording which must run before which.
//!
//! 3. When the outermost transaction scope closes, the affected cells are
//!    sorted and updated once each, dependencies first. A cycle aborts the
//!    transaction before any update runs.
//!
//! 4. Marks issued while updates are running are deferred and committed in
//!    a follow-up transaction.
//!
//! # Thread Safety
//!
//! A runtime and its cells are reference counted with `Rc` and are neither
//! `Send` nor `Sync`. Independent graphs on independent threads each get
//! their own runtime; one graph cannot be shared across threads.
//!
//! [`Cell::get`]: super::Cell::get

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, debug_span, trace, warn};

use super::context::DynVar;
use super::formula::FormulaCell;
use crate::config::RuntimeConfig;
use crate::error::{CellError, Result};
use crate::graph::{Dependencies, Enlisted, Observer, ObserverId, Transaction};

type SharedTransaction = Rc<RefCell<Transaction>>;

/// Counters describing the work a runtime has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Transactions that committed, follow-up rounds included.
    pub transactions: u64,

    /// Cell updates run by committed transactions.
    pub updates: u64,

    /// Transactions aborted because of a dependency cycle.
    pub cycles: u64,

    /// Follow-up transactions run for marks deferred during a commit.
    pub follow_up_rounds: u64,
}

/// Handle to the ambient context of one cell graph.
///
/// Cloning the handle is cheap; clones share the same context.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,

    /// Dependencies observed by the recompute in progress.
    reads: DynVar<Dependencies>,

    /// The open transaction, if any.
    transaction: DynVar<SharedTransaction>,

    stats: RefCell<RuntimeStats>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                reads: DynVar::new(),
                transaction: DynVar::new(),
                stats: RefCell::new(RuntimeStats::default()),
            }),
        }
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Snapshot of the runtime's counters.
    pub fn stats(&self) -> RuntimeStats {
        *self.inner.stats.borrow()
    }

    /// Create a formula cell holding `T::default()`.
    pub fn cell<T>(&self) -> Rc<FormulaCell<T>>
    where
        T: Clone + Default + 'static,
    {
        FormulaCell::new(self)
    }

    /// Check if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.inner.transaction.is_bound()
    }

    /// Check if a cell is recomputing.
    pub fn is_recomputing(&self) -> bool {
        self.inner.reads.is_bound()
    }

    /// Run `f` inside a transaction.
    ///
    /// All resets performed by `f` are committed together when `f` returns:
    /// every affected cell updates exactly once. If a transaction is already
    /// open, `f` joins it and the outermost scope commits.
    ///
    /// Returns [`CellError::Cycle`] if the affected cells cannot be ordered,
    /// in which case no cell was updated.
    pub fn transaction<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        if self.in_transaction() {
            return Ok(f());
        }

        let (out, mut deferred) = self.round(f)?;

        let mut rounds = 0;
        while !deferred.is_empty() {
            if rounds == self.inner.config.max_settle_rounds {
                warn!(rounds, pending = deferred.len(), "cells did not settle");
                return Err(CellError::Unsettled { rounds });
            }
            rounds += 1;
            self.inner.stats.borrow_mut().follow_up_rounds += 1;

            let pending = std::mem::take(&mut deferred);
            let (marked, next) =
                self.round(|| pending.iter().try_for_each(|observer| observer.node().mark()))?;
            marked?;
            deferred = next;
        }

        Ok(out)
    }

    /// Open one transaction, run `f` in it, and commit.
    ///
    /// Returns `f`'s result and the cells marked during the commit.
    fn round<R>(&self, f: impl FnOnce() -> R) -> Result<(R, Vec<Rc<dyn Observer>>)> {
        let tx: SharedTransaction = Rc::new(RefCell::new(Transaction::new()));
        let _binding = self.inner.transaction.bind(Rc::clone(&tx));
        let span = debug_span!("transaction");
        let _enter = span.enter();

        let out = f();

        let order = tx.borrow_mut().commit_order(self.inner.config.ready_order);
        let order = match order {
            Ok(order) => order,
            Err(err) => {
                self.inner.stats.borrow_mut().cycles += 1;
                warn!(%err, "transaction aborted");
                return Err(err);
            }
        };

        debug!(affected = order.len(), "committing transaction");
        for observer in &order {
            observer.update();
        }

        {
            let mut stats = self.inner.stats.borrow_mut();
            stats.transactions += 1;
            stats.updates += order.len() as u64;
        }

        let deferred = tx.borrow_mut().take_deferred();
        Ok((out, deferred))
    }

    /// Add `observer` to the open transaction.
    ///
    /// Returns `true` if it was newly added and its dependents still need
    /// marking.
    pub(crate) fn enlist(&self, observer: Rc<dyn Observer>) -> bool {
        let Some(tx) = self.inner.transaction.get() else {
            return false;
        };
        let id = observer.node().id();
        let outcome = tx.borrow_mut().enlist(observer);
        trace!(cell = %id, ?outcome, "marked");
        outcome == Enlisted::Added
    }

    /// Record in the open transaction that `before` runs before `after`.
    pub(crate) fn precede(&self, before: ObserverId, after: ObserverId) {
        if let Some(tx) = self.inner.transaction.get() {
            tx.borrow_mut().precede(before, after);
        }
    }

    /// Add `observer` to the read-set of the recompute in progress, if any.
    pub(crate) fn record_read(&self, observer: Rc<dyn Observer>) {
        let dedup = self.inner.config.dedup_reads;
        self.inner.reads.with_current(|reads| {
            let id = observer.node().id();
            if !(dedup && reads.iter().any(|read| read.node().id() == id)) {
                reads.push(observer);
            }
        });
    }

    /// Run `f` under a fresh read-set and return what it read.
    pub(crate) fn collect_reads<R>(&self, f: impl FnOnce() -> R) -> (R, Dependencies) {
        let binding = self.inner.reads.bind(Dependencies::new());
        let value = f();
        (value, binding.finish().unwrap_or_default())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("in_transaction", &self.in_transaction())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadyOrder;

    #[test]
    fn transaction_scope_is_visible_inside() {
        let runtime = Runtime::new();
        assert!(!runtime.in_transaction());

        let inside = runtime.transaction(|| runtime.in_transaction()).unwrap();
        assert!(inside);
        assert!(!runtime.in_transaction());
    }

    #[test]
    fn empty_transaction_commits_nothing() {
        let runtime = Runtime::new();
        runtime.transaction(|| ()).unwrap();

        let stats = runtime.stats();
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.updates, 0);
    }

    #[test]
    fn nested_transactions_commit_once() {
        let runtime = Runtime::new();
        let a = runtime.cell::<i32>();
        let b = runtime.cell::<i32>();

        runtime
            .transaction(|| {
                a.reset_value(1).unwrap();
                runtime.transaction(|| b.reset_value(2).unwrap()).unwrap();
                // Still pending: the inner scope joined the outer one.
                assert_eq!(b.get(), 0);
            })
            .unwrap();

        assert_eq!((a.get(), b.get()), (1, 2));
        assert_eq!(runtime.stats().transactions, 1);
        assert_eq!(runtime.stats().updates, 2);
    }

    #[test]
    fn reads_are_collected_only_while_recomputing() {
        let runtime = Runtime::new();
        let a = runtime.cell::<i32>();

        assert_eq!(a.get(), 0);
        assert!(!runtime.is_recomputing());

        let (value, reads) = runtime.collect_reads(|| {
            assert!(runtime.is_recomputing());
            a.get() + a.get()
        });
        assert_eq!(value, 0);
        assert_eq!(reads.len(), 1);
        assert!(!runtime.is_recomputing());
    }

    #[test]
    fn duplicate_reads_kept_when_dedup_disabled() {
        let runtime = Runtime::with_config(RuntimeConfig {
            dedup_reads: false,
            ..RuntimeConfig::default()
        });
        let a = runtime.cell::<i32>();

        let (_, reads) = runtime.collect_reads(|| a.get() + a.get());
        assert_eq!(reads.len(), 2);
    }

    #[test]
    fn cycle_is_counted() {
        let runtime = Runtime::with_config(RuntimeConfig {
            ready_order: ReadyOrder::Lifo,
            ..RuntimeConfig::default()
        });
        let a = runtime.cell::<i32>();
        let b = runtime.cell::<i32>();
        let (ra, rb) = (Rc::clone(&a), Rc::clone(&b));

        runtime
            .transaction(|| {
                a.reset(move || rb.get() + 1).unwrap();
                b.reset(move || ra.get() + 1).unwrap();
            })
            .unwrap();

        let err = a.reset_value(10).unwrap_err();
        assert!(err.is_cycle());
        assert_eq!(runtime.stats().cycles, 1);
    }

    #[test]
    fn marks_during_commit_run_in_follow_up() {
        let runtime = Runtime::new();
        let source = runtime.cell::<i32>();
        let target = runtime.cell::<i32>();
        let driver = runtime.cell::<()>();

        let (s, t) = (Rc::clone(&source), Rc::clone(&target));
        runtime
            .transaction(|| {
                source.reset_value(4).unwrap();
                driver
                    .reset(move || {
                        t.reset_value(s.get() * 10).unwrap();
                    })
                    .unwrap();
            })
            .unwrap();

        assert_eq!(target.get(), 40);
        assert_eq!(runtime.stats().follow_up_rounds, 1);

        source.reset_value(5).unwrap();
        assert_eq!(target.get(), 50);
    }

    #[test]
    fn endless_follow_ups_are_bounded() {
        let runtime = Runtime::with_config(RuntimeConfig {
            max_settle_rounds: 3,
            ..RuntimeConfig::default()
        });
        let looper = runtime.cell::<u32>();
        let me = Rc::downgrade(&looper);

        let err = looper
            .reset(move || {
                if let Some(me) = me.upgrade() {
                    me.mark().unwrap();
                }
                0
            })
            .unwrap_err();

        assert!(matches!(err, CellError::Unsettled { rounds: 3 }));
        assert_eq!(runtime.stats().follow_up_rounds, 3);
    }
}
