//! Lifecycle management for browser tabs embedded as shapes on an infinite canvas.
//!
//! Every browser-backed shape owns one tab in one of four states: hot (live on the
//! canvas), warm (running, detached), frozen (suspended) or discarded (destroyed).
//! A [`LifecycleLoop`] samples the viewport every few tens of milliseconds and
//! moves tabs between those states, keeping what the user is looking at alive while
//! bounding the cost of everything else.
//!
//! The pieces, bottom-up:
//!
//! - [`geometry`]: visible area of each shape, sliver filtering
//! - [`activity`]: audible/capturing/devtools/downloads/pinned flags and interaction times
//! - [`motion`]: zoom-active / pan-active / idle classification
//! - [`admission`]: which tabs should be hot
//! - [`lifecycle`]: the per-tab state machine
//! - [`reconcile`]: one tick combining all of the above
//! - [`scheduler`]: the tokio loop around it
//! - [`host`]: the queue of commands to the browser engine

pub mod activity;
pub mod admission;
pub mod canvas;
pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod geometry;
pub mod host;
pub mod ids;
pub mod lifecycle;
pub mod motion;
pub mod reconcile;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use activity::{ActivityBoard, ActivityOracle, TabFlags};
pub use canvas::{Camera, CanvasSource, TabInfo};
pub use clock::{Clock, ManualClock, Millis, MonotonicClock};
pub use config::{LifecycleConfig, LifecycleConfigBuilder};
pub use errors::{ConfigError, HostError, LifecycleError};
pub use events::{LifecycleEvent, LifecycleObserver, NoopObserver};
pub use geometry::{Rect, ShapeBounds, ShapeSample};
pub use host::{BrowserHost, HostCommand, HostDispatch, HostWorker};
pub use ids::{ShapeId, TabId};
pub use lifecycle::LifecycleState;
pub use motion::MotionPhase;
pub use reconcile::{LifecycleSnapshot, Reconciler, TickReport};
pub use scheduler::{LifecycleHandle, LifecycleLoop, TickOutcome};
