//! Scenario tests for the totals coordinator.

use std::cell::RefCell;
use std::rc::Rc;

use tally_totals::{
    Error, MemoryRowSource, Result, Row, RowId, RowSource, Subject, Subscription,
    SubscriptionRegistry, Totals, TotalsCoordinator, TotalsEntity, TotalsKey, Value,
};

fn make_row(id: u64, amount: i64) -> Row {
    Row::new(id, vec![Value::Int64(amount)])
}

fn coordinator() -> TotalsCoordinator<Totals> {
    TotalsCoordinator::new(SubscriptionRegistry::new(), Totals::all(), Totals::filtered()).unwrap()
}

/// Records the row IDs of every snapshot an observer receives.
#[derive(Clone, Default)]
struct Recorder {
    snapshots: Rc<RefCell<Vec<Vec<RowId>>>>,
}

impl Recorder {
    fn attach(&self, totals: &TotalsCoordinator<Totals>, key: TotalsKey) -> Subscription {
        let snapshots = self.snapshots.clone();
        totals
            .observe_entity(key, move |entity: &Totals| {
                snapshots
                    .borrow_mut()
                    .push(entity.rows().iter().map(Row::id).collect());
                Ok(())
            })
            .unwrap()
    }

    fn count(&self) -> usize {
        self.snapshots.borrow().len()
    }

    fn last(&self) -> Vec<RowId> {
        self.snapshots.borrow().last().cloned().unwrap_or_default()
    }
}

/// Row source that logs every metrics subscription together with the number
/// of metrics observers still live at that moment.
struct SpySource {
    inner: MemoryRowSource,
    observed: RefCell<Vec<(RowId, usize)>>,
}

impl SpySource {
    fn new() -> Self {
        Self {
            inner: MemoryRowSource::new(),
            observed: RefCell::new(Vec::new()),
        }
    }
}

impl RowSource for SpySource {
    fn rows(&self) -> Vec<Row> {
        self.inner.rows()
    }

    fn observe_filtered_rows(&self) -> Subject<Vec<Row>> {
        self.inner.observe_filtered_rows()
    }

    fn observe_all_rows(&self) -> Subject<Vec<Row>> {
        self.inner.observe_all_rows()
    }

    fn observe_row(&self, id: RowId) -> Subject<Row> {
        let live = self.inner.total_row_observers();
        self.observed.borrow_mut().push((id, live));
        self.inner.observe_row(id)
    }
}

#[test]
fn all_rows_batch_replaces_aggregate_set() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();

    source
        .publish_all(vec![make_row(1, 1), make_row(2, 2)])
        .unwrap();
    assert_eq!(totals.all_totals().rows().len(), 2);

    source.publish_all(vec![make_row(3, 3)]).unwrap();
    let ids: Vec<RowId> = totals.all_totals().rows().iter().map(Row::id).collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn filtered_batch_expands_collapsed_groups() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let filtered = Recorder::default();
    let _sub = filtered.attach(&totals, TotalsKey::Filtered);

    let group = Row::group(100, vec![], true, vec![make_row(2, 2), make_row(3, 3)]);
    let open_group = Row::group(200, vec![], false, vec![make_row(4, 4)]);
    source
        .publish_filtered(vec![make_row(1, 1), group, open_group, make_row(4, 4)])
        .unwrap();

    assert_eq!(filtered.count(), 2);
    assert_eq!(filtered.last(), vec![1, 2, 3, 4]);
    assert!(totals
        .filtered_totals()
        .rows()
        .iter()
        .all(|row| !row.is_aggregate()));
}

#[test]
fn metrics_subscription_is_cancelled_before_replacement() {
    let source = Rc::new(SpySource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();

    for first in [1, 2, 2, 3] {
        source
            .inner
            .publish_all(vec![make_row(first, 1), make_row(first + 10, 1)])
            .unwrap();
        assert_eq!(source.inner.total_row_observers(), 1);
        assert_eq!(totals.metrics_row(), Some(first));
    }

    let observed = source.observed.borrow();
    assert_eq!(
        observed.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![1, 2, 2, 3]
    );
    // No metrics observer was ever live when a new one was requested.
    assert!(observed.iter().all(|(_, live)| *live == 0));
}

#[test]
fn all_observer_notified_once_per_event() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let all = Recorder::default();
    let _sub = all.attach(&totals, TotalsKey::All);
    assert_eq!(all.count(), 1);

    // Batch plus the synchronous metrics replay for row 1: one notification.
    source
        .publish_all(vec![make_row(1, 1), make_row(2, 2)])
        .unwrap();
    assert_eq!(all.count(), 2);

    // Metric update on the representative row: one more.
    source.update_row(make_row(1, 5)).unwrap();
    assert_eq!(all.count(), 3);

    // Rows other than the representative are not followed.
    source.update_row(make_row(2, 7)).unwrap();
    assert_eq!(all.count(), 3);

    source.publish_all(vec![make_row(2, 7)]).unwrap();
    assert_eq!(all.count(), 4);
    assert_eq!(all.last(), vec![2]);
}

#[test]
fn scenario_batch_then_metrics_update() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let all = Recorder::default();
    let filtered = Recorder::default();
    let _a = all.attach(&totals, TotalsKey::All);
    let _f = filtered.attach(&totals, TotalsKey::Filtered);

    source
        .publish_all(vec![make_row(1, 10), make_row(2, 20)])
        .unwrap();
    assert_eq!(all.count(), 2);
    assert_eq!(all.last(), vec![1, 2]);
    let filtered_before = filtered.count();

    source.update_row(make_row(1, 11)).unwrap();

    assert_eq!(all.count(), 3);
    assert_eq!(filtered.count(), filtered_before + 1);
    assert_eq!(totals.all_totals().column_totals(), vec![Value::Int64(31)]);
}

#[test]
fn empty_batch_cancels_metrics() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();

    source.publish_all(vec![make_row(1, 1)]).unwrap();
    assert!(totals.has_metrics_subscription());
    assert_eq!(source.row_observer_count(1), 1);

    source.publish_all(vec![]).unwrap();
    assert!(!totals.has_metrics_subscription());
    assert_eq!(totals.metrics_row(), None);
    assert_eq!(source.total_row_observers(), 0);
    assert!(totals.all_totals().rows().is_empty());
}

#[test]
fn empty_first_batch_creates_no_metrics() {
    let source = Rc::new(SpySource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();

    source.inner.publish_all(vec![]).unwrap();

    assert!(!totals.has_metrics_subscription());
    assert!(source.observed.borrow().is_empty());
}

#[test]
fn deactivate_stops_notifications() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let all = Recorder::default();
    let filtered = Recorder::default();
    let _a = all.attach(&totals, TotalsKey::All);
    let _f = filtered.attach(&totals, TotalsKey::Filtered);
    source.publish_all(vec![make_row(1, 1)]).unwrap();
    let (all_before, filtered_before) = (all.count(), filtered.count());

    totals.deactivate();

    source.publish_all(vec![make_row(2, 2)]).unwrap();
    source.publish_filtered(vec![make_row(2, 2)]).unwrap();
    source.update_row(make_row(1, 9)).unwrap();

    assert_eq!(all.count(), all_before);
    assert_eq!(filtered.count(), filtered_before);
    assert!(!totals.is_active());
    assert_eq!(totals.subscriber_count(TotalsKey::All), 0);
    assert_eq!(totals.upstream_subscription_count(), 0);
    assert_eq!(source.all_observer_count(), 0);
    assert_eq!(source.filtered_observer_count(), 0);
    assert_eq!(source.total_row_observers(), 0);

    // Idempotent.
    totals.deactivate();
}

#[test]
fn reactivation_keeps_observers() {
    let first = Rc::new(MemoryRowSource::new());
    let second = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    let all = Recorder::default();
    let _a = all.attach(&totals, TotalsKey::All);

    totals.activate(first.clone()).unwrap();
    first.publish_all(vec![make_row(1, 1)]).unwrap();
    totals.activate(second.clone()).unwrap();

    assert_eq!(first.all_observer_count(), 0);
    assert_eq!(first.total_row_observers(), 0);

    second.publish_all(vec![make_row(5, 5)]).unwrap();
    assert_eq!(all.last(), vec![5]);
    assert_eq!(all.count(), 3);
}

#[test]
fn cancelled_observer_is_removed() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let all = Recorder::default();
    let mut sub = all.attach(&totals, TotalsKey::All);
    assert_eq!(totals.subscriber_count(TotalsKey::All), 1);

    assert!(sub.cancel());
    source.publish_all(vec![make_row(1, 1)]).unwrap();

    assert_eq!(all.count(), 1);
    assert_eq!(totals.subscriber_count(TotalsKey::All), 0);
}

#[test]
fn failing_observer_is_isolated_and_reported() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();

    let mut calls = 0;
    let _bad = totals
        .observe_entity(TotalsKey::All, move |_: &Totals| {
            calls += 1;
            if calls > 1 {
                Err(Error::subscriber_fault("view gone"))
            } else {
                Ok(())
            }
        })
        .unwrap();
    let all = Recorder::default();
    let _good = all.attach(&totals, TotalsKey::All);

    let err = source.publish_all(vec![make_row(1, 1)]).unwrap_err();
    assert_eq!(err.root(), &Error::subscriber_fault("view gone"));
    assert_eq!(all.count(), 2);

    // The coordinator keeps working after the fault.
    let _ = source.publish_all(vec![make_row(2, 2)]);
    assert_eq!(all.count(), 3);
    assert_eq!(totals.subscriber_count(TotalsKey::All), 2);
}

#[test]
fn changes_raised_during_flush_are_delivered_next_round() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    let filtered = Recorder::default();
    let _f = filtered.attach(&totals, TotalsKey::Filtered);

    // The first "all" notification after subscribing pushes a filtered batch.
    let upstream = source.clone();
    let mut pushed = false;
    let _a = totals
        .observe_entity(TotalsKey::All, move |entity: &Totals| -> Result<()> {
            if !entity.rows().is_empty() && !pushed {
                pushed = true;
                upstream.publish_filtered(vec![make_row(9, 9)])?;
            }
            Ok(())
        })
        .unwrap();

    source.publish_all(vec![make_row(1, 1)]).unwrap();

    // Metrics replay notified once; the nested filtered batch once more.
    assert_eq!(filtered.count(), 3);
    assert_eq!(filtered.last(), vec![9]);
}

#[test]
fn entity_pair_accessors() {
    let source = Rc::new(MemoryRowSource::new());
    let totals = coordinator();
    totals.activate(source.clone()).unwrap();
    source.publish_all(vec![make_row(1, 1)]).unwrap();
    source.publish_filtered(vec![]).unwrap();

    let (filtered, all) = totals.observe_all_entities();
    assert_eq!(filtered.key(), TotalsKey::Filtered);
    assert!(filtered.rows().is_empty());
    assert_eq!(all.rows().len(), 1);

    let (filtered_again, all_again) = totals.observe_filtered_entities();
    assert_eq!(filtered_again.rows().len(), filtered.rows().len());
    assert_eq!(all_again.rows().len(), all.rows().len());
}
