//! Notifications from the lifecycle loop to the UI layer.
//!
//! - [`LifecycleObserver`]: synchronous callback invoked for every state change
//!   of a tracked shape, e.g. to paint a "sleeping" badge. It runs inside the
//!   tick and must return quickly. A panic is caught and logged; the change
//!   still goes to the host and the event bus.
//! - [`LifecycleEvent`]: broadcast bus for debugging overlays and tooling.

use crate::ids::{ShapeId, TabId};
use crate::lifecycle::LifecycleState;
use crate::motion::MotionPhase;
use serde::Serialize;

pub trait LifecycleObserver: Send + Sync {
    fn set_lifecycle(&self, shape_id: &ShapeId, state: LifecycleState);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {
    fn set_lifecycle(&self, _shape_id: &ShapeId, _state: LifecycleState) {}
}

impl<F> LifecycleObserver for F
where
    F: Fn(&ShapeId, LifecycleState) + Send + Sync,
{
    fn set_lifecycle(&self, shape_id: &ShapeId, state: LifecycleState) {
        self(shape_id, state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    // ****************************************
    // ** Loop lifecycle
    /// Reconciliation loop has started
    LoopStarted { tick_interval_ms: u64 },
    /// Reconciliation loop has stopped
    LoopStopped,
    /// A tick was skipped because the previous one was still running
    TickSkipped,

    // ****************************************
    // ** Tab state
    /// A tracked tab changed lifecycle state
    StateChanged {
        tab_id: TabId,
        shape_id: ShapeId,
        from: Option<LifecycleState>,
        to: LifecycleState,
        phase: MotionPhase,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_are_observers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |shape: &ShapeId, state: LifecycleState| {
            sink.lock().unwrap().push(format!("{shape}={state}"));
        };

        observer.set_lifecycle(&ShapeId::from("s1"), LifecycleState::Frozen);
        NoopObserver.set_lifecycle(&ShapeId::from("s1"), LifecycleState::Hot);
        assert_eq!(*seen.lock().unwrap(), vec!["s1=frozen"]);
    }

    #[test]
    fn events_serialize_with_tag() {
        let ev = LifecycleEvent::StateChanged {
            tab_id: TabId::from("t"),
            shape_id: ShapeId::from("s"),
            from: None,
            to: LifecycleState::Hot,
            phase: MotionPhase::Idle,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "state_changed");
        assert_eq!(json["to"], "hot");
        assert_eq!(json["phase"], "idle");
        assert!(json["from"].is_null());
    }
}
