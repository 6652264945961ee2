//! Coordinator configuration.

/// Tuning knobs for a `TotalsCoordinator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Keep a live metrics subscription on the representative row of each
    /// "all rows" batch.
    pub track_metrics: bool,
    /// Notify observers when an empty batch replaces an already empty
    /// summary. Batches that change the summary always notify.
    pub notify_on_empty_batch: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            track_metrics: true,
            notify_on_empty_batch: true,
        }
    }
}

impl CoordinatorConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the representative-row metrics subscription is kept.
    pub fn with_track_metrics(mut self, track_metrics: bool) -> Self {
        self.track_metrics = track_metrics;
        self
    }

    /// Sets whether empty-over-empty batches notify.
    pub fn with_notify_on_empty_batch(mut self, notify: bool) -> Self {
        self.notify_on_empty_batch = notify;
        self
    }
}
