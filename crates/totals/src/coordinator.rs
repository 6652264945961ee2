//! Totals coordinator.
//!
//! `TotalsCoordinator` keeps the "all" and "filtered" summaries in step with
//! an upstream `RowSource` and republishes them per key.
//!
//! Every upstream callback runs as one turn of a `DirtySet`. Callbacks only
//! update the summaries and mark them dirty; observers are told once per
//! dirty summary after the outermost turn ends. When an "all rows" batch
//! re-subscribes the metrics stream and that stream fires synchronously, the
//! metrics callback runs inside the batch's turn and its change joins the
//! same notification.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use tally_totals::{MemoryRowSource, Totals, TotalsCoordinator, TotalsKey};
//! use tally_reactive::SubscriptionRegistry;
//!
//! let source = Rc::new(MemoryRowSource::new());
//! let totals = TotalsCoordinator::new(SubscriptionRegistry::new(), Totals::all(), Totals::filtered())?;
//! totals.activate(source.clone())?;
//!
//! let mut view = totals.observe_entity(TotalsKey::All, |all: &Totals| {
//!     println!("{:?}", all.column_totals());
//!     Ok(())
//! })?;
//!
//! source.publish_all(rows)?;
//! view.cancel();
//! totals.deactivate();
//! ```

use crate::config::CoordinatorConfig;
use crate::entity::{RowPredicate, RowSupplier, TotalsEntity, TotalsKey};
use crate::expand::expand_collapsed;
use crate::source::RowSource;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use tally_core::{Error, Result, Row, RowId};
use tally_reactive::{DirtySet, KeyedSubscribers, Subscription, SubscriptionRegistry};
use tracing::{debug, trace};

struct Shared<E: TotalsEntity> {
    config: CoordinatorConfig,
    all: RefCell<E>,
    filtered: RefCell<E>,
    /// Per-key observers of the two summaries
    subscribers: KeyedSubscribers<TotalsKey, E>,
    /// Upstream batch subscriptions (filtered and all)
    upstream: RefCell<SubscriptionRegistry>,
    /// The single live metrics subscription
    metrics: RefCell<Option<Subscription>>,
    metrics_row: Cell<Option<RowId>>,
    source: RefCell<Option<Rc<dyn RowSource>>>,
    dirty: RefCell<DirtySet<TotalsKey>>,
    active: Cell<bool>,
}

impl<E: TotalsEntity> Shared<E> {
    fn entity(&self, key: TotalsKey) -> &RefCell<E> {
        match key {
            TotalsKey::All => &self.all,
            TotalsKey::Filtered => &self.filtered,
        }
    }

    fn snapshot(&self, key: TotalsKey) -> E {
        self.entity(key).borrow().clone()
    }

    fn mark(&self, key: TotalsKey) {
        self.dirty.borrow_mut().mark(key);
    }

    /// Runs `work` as one turn and flushes if it was the outermost.
    ///
    /// The flush runs even when `work` fails, so summaries that were already
    /// updated are still announced. The first error wins.
    fn run_turn(&self, work: impl FnOnce() -> Result<()>) -> Result<()> {
        self.dirty.borrow_mut().begin();
        let outcome = work();
        let drained = self.dirty.borrow_mut().end();
        let flushed = match drained {
            Some(keys) => self.flush(keys),
            None => Ok(()),
        };
        outcome.and(flushed)
    }

    fn flush(&self, mut keys: Vec<TotalsKey>) -> Result<()> {
        let mut first_error = None;
        loop {
            trace!(?keys, "flushing totals notifications");
            // Changes raised by observers during delivery go to the next round.
            self.dirty.borrow_mut().begin();
            for key in keys {
                if let Err(err) = self.notify(key) {
                    first_error.get_or_insert(err);
                }
            }
            let next = self.dirty.borrow_mut().end();
            match next {
                Some(more) => keys = more,
                None => break,
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn notify(&self, key: TotalsKey) -> Result<()> {
        let snapshot = self.snapshot(key);
        self.subscribers.notify(&key, &snapshot)
    }

    fn skip_empty(&self, key: TotalsKey, incoming_empty: bool) -> bool {
        !self.config.notify_on_empty_batch
            && incoming_empty
            && self.entity(key).borrow().rows().is_empty()
    }

    fn on_filtered_rows(&self, rows: &[Row]) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        let leaves = expand_collapsed(rows);
        trace!(received = rows.len(), leaves = leaves.len(), "filtered rows");

        let skip = self.skip_empty(TotalsKey::Filtered, leaves.is_empty());
        self.filtered.borrow_mut().set_rows(leaves);
        if !skip {
            self.mark(TotalsKey::Filtered);
        }
        Ok(())
    }

    fn on_all_rows(self: &Rc<Self>, rows: &[Row]) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        trace!(received = rows.len(), "all rows");

        let skip = self.skip_empty(TotalsKey::All, rows.is_empty());
        self.all.borrow_mut().set_rows(rows.to_vec());
        if !skip {
            self.mark(TotalsKey::All);
        }

        let representative = rows.first().map(Row::id);
        self.resubscribe_metrics(representative)
    }

    fn on_metrics(&self) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        // A metric update may move either summary.
        self.mark(TotalsKey::Filtered);
        self.mark(TotalsKey::All);
        Ok(())
    }

    fn cancel_metrics(&self) {
        let previous = self.metrics.borrow_mut().take();
        if let Some(mut previous) = previous {
            previous.cancel();
        }
        self.metrics_row.set(None);
    }

    /// Replaces the metrics subscription, cancelling the old one first.
    fn resubscribe_metrics(self: &Rc<Self>, representative: Option<RowId>) -> Result<()> {
        let previous_row = self.metrics_row.get();
        self.cancel_metrics();

        let Some(id) = representative else {
            if previous_row.is_some() {
                debug!("metrics subscription dropped: empty batch");
            }
            return Ok(());
        };
        if !self.config.track_metrics {
            return Ok(());
        }
        let source = self.source.borrow().clone();
        let Some(source) = source else {
            return Ok(());
        };

        if previous_row != Some(id) {
            debug!(row = id, "metrics subscription moved");
        }
        let weak = Rc::downgrade(self);
        let subscription = source.observe_row(id).subscribe(move |_row: &Row| {
            with_live(&weak, |shared| shared.run_turn(|| shared.on_metrics()))
        })?;
        *self.metrics.borrow_mut() = Some(subscription);
        self.metrics_row.set(Some(id));
        Ok(())
    }

    /// Cancels everything tied to the current source. Observers stay.
    fn detach(&self) {
        self.cancel_metrics();
        let released = self.upstream.borrow_mut().release_all();
        if released > 0 {
            trace!(released, "released upstream subscriptions");
        }
    }
}

fn with_live<E: TotalsEntity>(
    weak: &Weak<Shared<E>>,
    work: impl FnOnce(&Rc<Shared<E>>) -> Result<()>,
) -> Result<()> {
    match weak.upgrade() {
        Some(shared) => work(&shared),
        None => Ok(()),
    }
}

/// Keeps the "all" and "filtered" totals entities consistent with an
/// upstream row source and publishes their changes.
pub struct TotalsCoordinator<E: TotalsEntity> {
    shared: Rc<Shared<E>>,
}

impl<E: TotalsEntity> TotalsCoordinator<E> {
    /// Creates an inactive coordinator with the default configuration.
    ///
    /// Fails if `all` and `filtered` do not carry the matching keys.
    pub fn new(registry: SubscriptionRegistry, all: E, filtered: E) -> Result<Self> {
        Self::with_config(CoordinatorConfig::default(), registry, all, filtered)
    }

    /// Creates an inactive coordinator.
    pub fn with_config(
        config: CoordinatorConfig,
        registry: SubscriptionRegistry,
        all: E,
        filtered: E,
    ) -> Result<Self> {
        for (expected, entity) in [(TotalsKey::All, &all), (TotalsKey::Filtered, &filtered)] {
            if entity.key() != expected {
                return Err(Error::key_mismatch(
                    expected.as_str(),
                    entity.key().as_str(),
                ));
            }
        }

        Ok(Self {
            shared: Rc::new(Shared {
                config,
                all: RefCell::new(all),
                filtered: RefCell::new(filtered),
                subscribers: KeyedSubscribers::new(),
                upstream: RefCell::new(registry),
                metrics: RefCell::new(None),
                metrics_row: Cell::new(None),
                source: RefCell::new(None),
                dirty: RefCell::new(DirtySet::new()),
                active: Cell::new(false),
            }),
        })
    }

    /// Wires the coordinator to `source`.
    ///
    /// A previous activation is torn down first. Both upstream batch
    /// subscriptions are retained in the subscription registry. Batches the
    /// source delivers while subscribing are announced once, when this call
    /// returns.
    pub fn activate(&self, source: Rc<dyn RowSource>) -> Result<()> {
        let shared = &self.shared;
        if shared.active.get() {
            debug!("re-activating totals coordinator");
            shared.detach();
        }

        let supplier_source = source.clone();
        let supplier: RowSupplier = Rc::new(move || supplier_source.rows());
        shared.all.borrow_mut().set_row_supplier(Some(supplier.clone()));
        shared.filtered.borrow_mut().set_row_supplier(Some(supplier));

        *shared.source.borrow_mut() = Some(source.clone());
        shared.active.set(true);
        debug!("totals coordinator activated");

        shared.run_turn(|| {
            let weak = Rc::downgrade(shared);
            let filtered = source
                .observe_filtered_rows()
                .subscribe(move |rows: &Vec<Row>| {
                    with_live(&weak, |s| s.run_turn(|| s.on_filtered_rows(rows)))
                })?;
            shared.upstream.borrow_mut().add(filtered);

            let weak = Rc::downgrade(shared);
            let all = source.observe_all_rows().subscribe(move |rows: &Vec<Row>| {
                with_live(&weak, |s| s.run_turn(|| s.on_all_rows(rows)))
            })?;
            shared.upstream.borrow_mut().add(all);
            Ok(())
        })
    }

    /// Tears everything down: the metrics subscription, every registered
    /// observer and the upstream subscriptions.
    ///
    /// Safe to call repeatedly or on a coordinator that was never activated.
    pub fn deactivate(&self) {
        let shared = &self.shared;
        let was_active = shared.active.replace(false);
        shared.detach();
        shared.subscribers.clear();
        shared.dirty.borrow_mut().discard();
        *shared.source.borrow_mut() = None;
        // The suppliers hold the source too.
        shared.all.borrow_mut().set_row_supplier(None);
        shared.filtered.borrow_mut().set_row_supplier(None);
        if was_active {
            debug!("totals coordinator deactivated");
        }
    }

    /// Observes one summary: `observer` gets the current snapshot right away
    /// and again after every change notification for `key`.
    pub fn observe_entity<F>(&self, key: TotalsKey, observer: F) -> Result<Subscription>
    where
        F: FnMut(&E) -> Result<()> + 'static,
    {
        let snapshot = self.shared.snapshot(key);
        self.shared.subscribers.subscribe_for(key, &snapshot, observer)
    }

    /// Returns the (filtered, all) pair once.
    ///
    /// This is a one-shot read: the pair is a snapshot taken now and does not
    /// update. Use `observe_entity` to follow changes.
    pub fn observe_all_entities(&self) -> (E, E) {
        (
            self.shared.snapshot(TotalsKey::Filtered),
            self.shared.snapshot(TotalsKey::All),
        )
    }

    /// Returns the same one-shot (filtered, all) snapshot pair as
    /// `observe_all_entities`.
    pub fn observe_filtered_entities(&self) -> (E, E) {
        self.observe_all_entities()
    }

    /// Pushes the current snapshot for `key` to its observers now.
    pub fn notify_entity_changed(&self, key: TotalsKey) -> Result<()> {
        self.shared.notify(key)
    }

    /// Applies `predicate` as base filter of both summaries. Observers are
    /// not notified; the next upstream batch re-renders them.
    pub fn set_base_filter<P>(&self, predicate: P)
    where
        P: Fn(&Row) -> bool + 'static,
    {
        let predicate: RowPredicate = Rc::new(predicate);
        self.shared
            .all
            .borrow_mut()
            .set_base_filter(Some(predicate.clone()));
        self.shared
            .filtered
            .borrow_mut()
            .set_base_filter(Some(predicate));
    }

    /// Removes the base filter from both summaries, without notifying.
    pub fn clear_base_filter(&self) {
        self.shared.all.borrow_mut().set_base_filter(None);
        self.shared.filtered.borrow_mut().set_base_filter(None);
    }

    /// Returns a snapshot of the "all rows" summary.
    pub fn all_totals(&self) -> E {
        self.shared.snapshot(TotalsKey::All)
    }

    /// Returns a snapshot of the "filtered rows" summary.
    pub fn filtered_totals(&self) -> E {
        self.shared.snapshot(TotalsKey::Filtered)
    }

    /// Returns true between `activate` and `deactivate`.
    pub fn is_active(&self) -> bool {
        self.shared.active.get()
    }

    /// Returns true while a metrics subscription is live.
    pub fn has_metrics_subscription(&self) -> bool {
        self.shared.metrics.borrow().is_some()
    }

    /// Returns the row the metrics subscription follows.
    pub fn metrics_row(&self) -> Option<RowId> {
        self.shared.metrics_row.get()
    }

    /// Returns the number of observers of `key`.
    pub fn subscriber_count(&self, key: TotalsKey) -> usize {
        self.shared.subscribers.subscriber_count(&key)
    }

    /// Returns the number of upstream subscriptions held.
    pub fn upstream_subscription_count(&self) -> usize {
        self.shared.upstream.borrow().len()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }
}

impl<E: TotalsEntity> Drop for TotalsCoordinator<E> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
