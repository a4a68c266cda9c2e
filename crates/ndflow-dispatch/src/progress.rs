//! Thread-safe progress aggregation with threshold-crossing events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ndflow_core::event::{EventHub, StageEvent};

/// Aggregates per-worker completion counts and broadcasts fractional
/// progress through a stage's [`EventHub`].
///
/// Workers call [`ProgressReporter::completed`] after each unit of
/// work; the increment is a single `fetch_add`, never a lock. Only
/// when the count crosses a reporting bucket does the crossing thread
/// take a small emission lock, re-check the high-water mark, and emit
/// one `Progress` event. Each threshold therefore fires exactly once,
/// the observed fraction sequence is non-decreasing, and `1.0` is
/// emitted exactly once at completion.
///
/// Scoped to one stage execution and discarded afterwards.
pub struct ProgressReporter<'a> {
    hub: &'a EventHub,
    stage: String,
    total: u64,
    buckets: u64,
    completed: AtomicU64,
    /// Highest bucket already emitted; guarded by `emit` for the
    /// re-check, read optimistically outside it.
    high_water: AtomicU64,
    emit: Mutex<()>,
}

impl<'a> ProgressReporter<'a> {
    /// Default reporting granularity: one event per 1% of the total.
    pub const DEFAULT_BUCKETS: u64 = 100;

    /// Create a reporter for `total_units` units of work, attributing
    /// events to `stage` on `hub`.
    pub fn new(hub: &'a EventHub, stage: impl Into<String>, total_units: u64) -> Self {
        Self::with_buckets(hub, stage, total_units, Self::DEFAULT_BUCKETS)
    }

    /// Create a reporter emitting one event per `1/buckets` of the
    /// total.
    pub fn with_buckets(
        hub: &'a EventHub,
        stage: impl Into<String>,
        total_units: u64,
        buckets: u64,
    ) -> Self {
        Self {
            hub,
            stage: stage.into(),
            total: total_units.max(1),
            buckets: buckets.clamp(1, total_units.max(1)),
            completed: AtomicU64::new(0),
            high_water: AtomicU64::new(0),
            emit: Mutex::new(()),
        }
    }

    /// Record `units` more units of work done.
    ///
    /// Called concurrently from worker threads. Observer failures are
    /// deliberately dropped here: progress is advisory and must never
    /// fail a computation.
    pub fn completed(&self, units: u64) {
        if units == 0 {
            return;
        }
        let done = self.completed.fetch_add(units, Ordering::AcqRel) + units;
        let done = done.min(self.total);
        let bucket = done * self.buckets / self.total;
        if bucket <= self.high_water.load(Ordering::Acquire) {
            return;
        }
        // Rare path: serialize emission so listeners observe a
        // monotone fraction sequence even when crossings race.
        let _guard = self.emit.lock().unwrap_or_else(|e| e.into_inner());
        if bucket > self.high_water.load(Ordering::Acquire) {
            self.high_water.store(bucket, Ordering::Release);
            let _ = self.hub.notify(&StageEvent::Progress {
                stage: self.stage.clone(),
                fraction: bucket as f64 / self.buckets as f64,
            });
        }
    }

    /// Current fraction complete in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let done = self.completed.load(Ordering::Acquire).min(self.total);
        done as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndflow_core::event::{Observer, ObserverError, StageEventKind};
    use std::sync::{Arc, Mutex as StdMutex};

    /// Collects progress fractions in arrival order.
    struct Fractions(Arc<StdMutex<Vec<f64>>>);

    impl Observer for Fractions {
        fn notify(&self, event: &StageEvent) -> Result<(), ObserverError> {
            if let StageEvent::Progress { fraction, .. } = event {
                self.0.lock().unwrap().push(*fraction);
            }
            Ok(())
        }
    }

    fn collecting_hub() -> (EventHub, Arc<StdMutex<Vec<f64>>>) {
        let hub = EventHub::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        hub.subscribe(StageEventKind::Progress, Arc::new(Fractions(Arc::clone(&log))));
        (hub, log)
    }

    #[test]
    fn emits_once_per_bucket() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 100, 4);
        for _ in 0..100 {
            reporter.completed(1);
        }
        assert_eq!(*log.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn large_increment_skips_to_highest_bucket() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 100, 4);
        reporter.completed(80);
        // One event at the high-water bucket, not one per skipped bucket.
        assert_eq!(*log.lock().unwrap(), vec![0.75]);
        reporter.completed(20);
        assert_eq!(*log.lock().unwrap(), vec![0.75, 1.0]);
    }

    #[test]
    fn sub_bucket_progress_emits_nothing() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 1000, 10);
        reporter.completed(99);
        assert!(log.lock().unwrap().is_empty());
        assert!((reporter.fraction() - 0.099).abs() < 1e-12);
    }

    #[test]
    fn one_point_zero_exactly_once() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 8, 8);
        for _ in 0..8 {
            reporter.completed(1);
        }
        // Overshoot must not re-emit completion.
        reporter.completed(3);
        let fractions = log.lock().unwrap();
        let ones = fractions.iter().filter(|&&f| f == 1.0).count();
        assert_eq!(ones, 1);
    }

    #[test]
    fn concurrent_workers_observe_monotone_fractions() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 4096, 100);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..512 {
                        reporter.completed(1);
                    }
                });
            }
        });
        let fractions = log.lock().unwrap();
        assert!(
            fractions.windows(2).all(|w| w[0] < w[1]),
            "fractions must be strictly increasing: {fractions:?}"
        );
        assert_eq!(fractions.last(), Some(&1.0));
        assert_eq!(reporter.fraction(), 1.0);
    }

    #[test]
    fn total_zero_is_treated_as_one_unit() {
        let (hub, log) = collecting_hub();
        let reporter = ProgressReporter::with_buckets(&hub, "s", 0, 100);
        reporter.completed(1);
        assert_eq!(*log.lock().unwrap(), vec![1.0]);
    }
}
