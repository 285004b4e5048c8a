#![deny(missing_docs)]
//! Per-worker metrics for PIOL jobs.
//!
//! Each worker owns one [`PiolMetrics`] registry recording the bytes it moves through the IO
//! layer and the work done by the distributed algorithms. Snapshots tag every metric with the
//! worker's rank so registries of a whole job can be merged by a reporter.

use std::sync::Arc;

use witchcraft_metrics::{Metric, MetricRegistry, Metrics, MetricsIter};

pub use witchcraft_metrics::{Counter, MetricId, Timer};

/// Bytes read from the raw byte collaborator.
pub const IO_BYTES_READ: &str = "piol.io.bytes_read";
/// Bytes written to the raw byte collaborator.
pub const IO_BYTES_WRITTEN: &str = "piol.io.bytes_written";
/// Read calls issued after coalescing.
pub const IO_READ_CALLS: &str = "piol.io.read_calls";
/// Exchange rounds run by the distributed sort.
pub const SORT_ROUNDS: &str = "piol.sort.rounds";
/// Elements that crossed a worker boundary during the distributed sort.
pub const SORT_MOVED: &str = "piol.sort.moved";
/// Wall time of the distributed sort.
pub const SORT_TIMER: &str = "piol.sort";
/// Wall time of the distributed min/max reduction.
pub const MIN_MAX_TIMER: &str = "piol.min_max";

const RANK_TAG: &str = "rank";

/// The metric registry of one worker.
#[derive(Default)]
pub struct PiolMetrics {
    registry: MetricRegistry,
    rank: usize,
}

impl PiolMetrics {
    /// An empty registry for the worker of rank `rank`.
    pub fn for_rank(rank: usize) -> Self {
        Self {
            registry: MetricRegistry::default(),
            rank,
        }
    }

    /// The rank every snapshot is tagged with.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The counter named `id`, registered on first use.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered as another kind of metric.
    pub fn counter<T>(&self, id: T) -> Arc<Counter>
    where
        T: Into<MetricId>,
    {
        self.registry.counter(id)
    }

    /// The timer named `id`, registered on first use.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered as another kind of metric.
    pub fn timer<T>(&self, id: T) -> Arc<Timer>
    where
        T: Into<MetricId>,
    {
        self.registry.timer(id)
    }

    /// Record `bytes` read in `calls` read operations.
    pub fn record_read(&self, bytes: u64, calls: u64) {
        self.counter(IO_BYTES_READ).add(saturating_i64(bytes));
        self.counter(IO_READ_CALLS).add(saturating_i64(calls));
    }

    /// Record `bytes` written.
    pub fn record_write(&self, bytes: u64) {
        self.counter(IO_BYTES_WRITTEN).add(saturating_i64(bytes));
    }

    /// Current value of the counter `id`, or how often the timer `id` was updated.
    ///
    /// Zero when nothing is registered under `id`. Never registers `id` itself.
    pub fn count(&self, id: &'static str) -> i64 {
        let id = MetricId::new(id);
        self.registry
            .metrics()
            .iter()
            .find(|(registered, _)| **registered == id)
            .map_or(0, |(_, metric)| match metric {
                Metric::Counter(counter) => counter.count(),
                Metric::Timer(timer) => timer.count(),
                _ => 0,
            })
    }

    /// A point-in-time copy of every registered metric.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            metrics: self.registry.metrics(),
            rank: self.rank.to_string(),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// The metrics of one worker at the time [`PiolMetrics::snapshot`] was called.
pub struct Snapshot {
    metrics: Metrics,
    rank: String,
}

impl Snapshot {
    /// Every metric, its id tagged with the worker's rank.
    pub fn iter(&self) -> SnapshotIter<'_> {
        SnapshotIter {
            inner: self.metrics.iter(),
            rank: &self.rank,
        }
    }
}

/// Iterator over a [`Snapshot`].
pub struct SnapshotIter<'a> {
    inner: MetricsIter<'a>,
    rank: &'a str,
}

impl<'a> Iterator for SnapshotIter<'a> {
    type Item = (MetricId, &'a Metric);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, metric) = self.inner.next()?;
        Some((id.clone().with_tag(RANK_TAG, self.rank.to_string()), metric))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn io_counters_accumulate() {
        let metrics = PiolMetrics::for_rank(3);
        metrics.record_read(240, 1);
        metrics.record_read(480, 2);
        metrics.record_write(100);

        assert_eq!(metrics.count(IO_BYTES_READ), 720);
        assert_eq!(metrics.count(IO_READ_CALLS), 3);
        assert_eq!(metrics.count(IO_BYTES_WRITTEN), 100);
        assert_eq!(metrics.count(SORT_MOVED), 0);
    }

    #[test]
    fn count_reads_timers_without_registering() {
        let metrics = PiolMetrics::for_rank(0);
        assert_eq!(metrics.count(SORT_TIMER), 0);
        assert_eq!(metrics.snapshot().iter().count(), 0);

        let timer = metrics.timer(SORT_TIMER);
        timer.update(Duration::from_millis(3));
        timer.update(Duration::from_millis(5));
        assert_eq!(metrics.count(SORT_TIMER), 2);
        assert_eq!(metrics.snapshot().iter().count(), 1);
    }

    #[test]
    fn snapshot_applies_rank_tag() {
        let metrics = PiolMetrics::for_rank(7);
        metrics.counter(SORT_ROUNDS).inc();

        let snapshot = metrics.snapshot();
        let ids = snapshot.iter().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].name(), SORT_ROUNDS);
        assert_eq!(ids[0], MetricId::new(SORT_ROUNDS).with_tag(RANK_TAG, "7"));
    }
}
