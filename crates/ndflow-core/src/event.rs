//! Per-stage event channel: publish/subscribe for lifecycle milestones.
//!
//! Each stage owns an [`EventHub`]. External listeners subscribe for a
//! [`StageEventKind`] and receive [`StageEvent`]s in subscription
//! order. A failing observer does not prevent delivery to subsequent
//! observers; the first failure is reported to the notifier after the
//! full loop completes. There is no ambient global event bus.

use indexmap::IndexMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::id::SubscriptionId;

/// How a stage execution or iteration loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A plain (non-iterative) execution ran to completion.
    Completed,
    /// An iterative loop satisfied its internal stop predicate
    /// (convergence threshold met or iteration budget reached).
    Converged,
    /// An iterative loop observed the external stop flag.
    StoppedEarly,
}

/// Kinds of stage lifecycle events, used as subscription filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageEventKind {
    /// Execution is about to begin.
    Start,
    /// Fractional completion crossed a reporting threshold.
    Progress,
    /// An iterative stage finished one pass of its loop.
    Iteration,
    /// Execution finished.
    End,
    /// Matches every event kind.
    Any,
}

/// A stage lifecycle event, attributed to the emitting stage by name.
#[derive(Clone, Debug, PartialEq)]
pub enum StageEvent {
    /// Execution is starting.
    Start {
        /// Name of the executing stage.
        stage: String,
    },
    /// Fraction of the requested region completed, in `[0, 1]`.
    Progress {
        /// Name of the executing stage.
        stage: String,
        /// Fraction complete.
        fraction: f64,
    },
    /// One pass of an iterative loop completed.
    Iteration {
        /// Name of the executing stage.
        stage: String,
        /// Zero-based iteration index.
        index: u64,
        /// Current convergence metric.
        metric: f64,
    },
    /// Execution finished.
    End {
        /// Name of the executing stage.
        stage: String,
        /// How it ended.
        outcome: RunOutcome,
    },
}

impl StageEvent {
    /// The kind of this event (never [`StageEventKind::Any`]).
    pub fn kind(&self) -> StageEventKind {
        match self {
            Self::Start { .. } => StageEventKind::Start,
            Self::Progress { .. } => StageEventKind::Progress,
            Self::Iteration { .. } => StageEventKind::Iteration,
            Self::End { .. } => StageEventKind::End,
        }
    }

    /// Name of the stage that emitted this event.
    pub fn stage(&self) -> &str {
        match self {
            Self::Start { stage }
            | Self::Progress { stage, .. }
            | Self::Iteration { stage, .. }
            | Self::End { stage, .. } => stage,
        }
    }
}

/// Error returned by an observer's `notify`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserverError {
    /// Human-readable description of the failure.
    pub reason: String,
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer failed: {}", self.reason)
    }
}

impl Error for ObserverError {}

/// The first observer failure seen during a notification loop.
///
/// Delivery to all remaining observers completed before this was
/// returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyError {
    /// Which subscription failed.
    pub subscription: SubscriptionId,
    /// The observer's error.
    pub error: ObserverError,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription {} failed: {}", self.subscription, self.error)
    }
}

impl Error for NotifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Minimal "receives event" capability.
///
/// Observers are shared across worker threads (progress events are
/// emitted from whichever worker crosses a threshold), hence
/// `Send + Sync`.
pub trait Observer: Send + Sync {
    /// Receive one event. Failures are collected by the hub, not
    /// propagated mid-loop.
    fn notify(&self, event: &StageEvent) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&StageEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn notify(&self, event: &StageEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Per-stage broadcast source.
///
/// The registry lock is held only to snapshot the observer list;
/// observers themselves run lock-free, so a slow observer cannot block
/// subscription changes from other threads.
#[derive(Default)]
pub struct EventHub {
    registry: Mutex<IndexMap<SubscriptionId, (StageEventKind, Arc<dyn Observer>)>>,
    next_id: AtomicU64,
}

// IndexMap preserves insertion order, giving the required
// notification-order-equals-subscription-order guarantee.
impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.subscription_count();
        f.debug_struct("EventHub").field("subscriptions", &n).finish()
    }
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for events of `kind`
    /// ([`StageEventKind::Any`] matches everything).
    pub fn subscribe(&self, kind: StageEventKind, observer: Arc<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.insert(id, (kind, observer));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.shift_remove(&id).is_some()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver `event` to every matching observer in subscription
    /// order. All observers are notified even if one fails; the first
    /// failure is returned afterwards.
    pub fn notify(&self, event: &StageEvent) -> Result<(), NotifyError> {
        let matching: Vec<(SubscriptionId, Arc<dyn Observer>)> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .iter()
                .filter(|(_, (kind, _))| *kind == StageEventKind::Any || *kind == event.kind())
                .map(|(&id, (_, obs))| (id, Arc::clone(obs)))
                .collect()
        };

        let mut first_failure: Option<NotifyError> = None;
        for (id, observer) in matching {
            if let Err(error) = observer.notify(event) {
                first_failure.get_or_insert(NotifyError {
                    subscription: id,
                    error,
                });
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records the order in which it saw events.
    struct Recorder {
        label: &'static str,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl Observer for Recorder {
        fn notify(&self, event: &StageEvent) -> Result<(), ObserverError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.label, event.kind()));
            Ok(())
        }
    }

    /// Always fails.
    struct Failing;

    impl Observer for Failing {
        fn notify(&self, _event: &StageEvent) -> Result<(), ObserverError> {
            Err(ObserverError {
                reason: "boom".into(),
            })
        }
    }

    fn start_event() -> StageEvent {
        StageEvent::Start {
            stage: "test".into(),
        }
    }

    #[test]
    fn delivery_in_subscription_order() {
        let hub = EventHub::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        hub.subscribe(
            StageEventKind::Any,
            Arc::new(Recorder {
                label: "a",
                log: Arc::clone(&log),
            }),
        );
        hub.subscribe(
            StageEventKind::Start,
            Arc::new(Recorder {
                label: "b",
                log: Arc::clone(&log),
            }),
        );
        hub.notify(&start_event()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:Start", "b:Start"]);
    }

    #[test]
    fn kind_filter_applies() {
        let hub = EventHub::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        hub.subscribe(
            StageEventKind::End,
            Arc::new(Recorder {
                label: "end-only",
                log: Arc::clone(&log),
            }),
        );
        hub.notify(&start_event()).unwrap();
        assert!(log.lock().unwrap().is_empty());
        hub.notify(&StageEvent::End {
            stage: "test".into(),
            outcome: RunOutcome::Completed,
        })
        .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_observer_does_not_block_later_ones() {
        let hub = EventHub::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let failing_id = hub.subscribe(StageEventKind::Any, Arc::new(Failing));
        hub.subscribe(
            StageEventKind::Any,
            Arc::new(Recorder {
                label: "after",
                log: Arc::clone(&log),
            }),
        );

        let err = hub.notify(&start_event()).unwrap_err();
        assert_eq!(err.subscription, failing_id);
        assert_eq!(err.error.reason, "boom");
        // Later observer still saw the event.
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn first_of_several_failures_wins() {
        let hub = EventHub::new();
        let first = hub.subscribe(StageEventKind::Any, Arc::new(Failing));
        let _second = hub.subscribe(StageEventKind::Any, Arc::new(Failing));
        let err = hub.notify(&start_event()).unwrap_err();
        assert_eq!(err.subscription, first);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = EventHub::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let id = hub.subscribe(
            StageEventKind::Any,
            Arc::new(Recorder {
                label: "a",
                log: Arc::clone(&log),
            }),
        );
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.notify(&start_event()).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn closures_are_observers() {
        let hub = EventHub::new();
        let seen = Arc::new(StdMutex::new(0usize));
        let seen2 = Arc::clone(&seen);
        hub.subscribe(
            StageEventKind::Any,
            Arc::new(move |_event: &StageEvent| {
                *seen2.lock().unwrap() += 1;
                Ok(())
            }),
        );
        hub.notify(&start_event()).unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
