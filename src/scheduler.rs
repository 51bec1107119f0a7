//! Drives the [`Reconciler`] at a fixed cadence on the tokio runtime.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tab_lifecycle::*;
//! # async fn demo(canvas: Arc<dyn CanvasSource>, host: Arc<dyn BrowserHost>) -> Result<(), LifecycleError> {
//! let activity = Arc::new(ActivityBoard::new());
//! let (dispatch, commands) = HostDispatch::channel();
//! let reconciler = Reconciler::new(LifecycleConfig::default(), canvas, activity, dispatch)?;
//!
//! let (handle, join) = LifecycleLoop::new(reconciler).with_host_worker(host, commands).start()?;
//! // ...
//! handle.shutdown();
//! let _ = join.await;
//! # Ok(())
//! # }
//! ```

use crate::errors::LifecycleError;
use crate::events::LifecycleEvent;
use crate::host::{BrowserHost, HostCommand, HostWorker};
use crate::ids::ShapeId;
use crate::reconcile::{LifecycleSnapshot, Reconciler, TickReport};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ran(TickReport),
    /// A previous tick (or a handle call) still held the reconciler.
    Skipped,
}

/// Locks the reconciler; a panic inside an earlier tick does not stop the loop.
fn lock(reconciler: &Mutex<Reconciler>) -> MutexGuard<'_, Reconciler> {
    reconciler.lock().unwrap_or_else(|poisoned| {
        log::warn!("lifecycle reconciler lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

pub struct LifecycleLoop {
    reconciler: Arc<Mutex<Reconciler>>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    tick_interval: Duration,
    cancel: CancellationToken,
    worker: Option<HostWorker>,
}

impl LifecycleLoop {
    pub fn new(reconciler: Reconciler) -> Self {
        let event_tx = reconciler.event_sender();
        let tick_interval = reconciler.config().tick_interval();

        Self {
            reconciler: Arc::new(Mutex::new(reconciler)),
            event_tx,
            tick_interval,
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    /// Also drain the reconciler's host commands against `host` while the loop runs.
    pub fn with_host_worker(mut self, host: Arc<dyn BrowserHost>, commands: mpsc::UnboundedReceiver<HostCommand>) -> Self {
        self.worker = Some(HostWorker::new(host, commands, self.cancel.clone()));
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Run a single tick unless one is already in progress.
    pub fn run_once(&self) -> TickOutcome {
        match self.reconciler.try_lock() {
            Ok(mut reconciler) => TickOutcome::Ran(reconciler.tick()),
            Err(TryLockError::WouldBlock) => {
                log::debug!("lifecycle tick skipped, reconciler busy");
                let _ = self.event_tx.send(LifecycleEvent::TickSkipped);
                TickOutcome::Skipped
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("lifecycle reconciler lock was poisoned, recovering");
                TickOutcome::Ran(poisoned.into_inner().tick())
            }
        }
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn start(self) -> Result<(LifecycleHandle, JoinHandle<()>), LifecycleError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        let handle = LifecycleHandle {
            reconciler: self.reconciler.clone(),
            event_tx: self.event_tx.clone(),
            cancel: self.cancel.clone(),
        };
        let join_handle = runtime.spawn(self.run());

        Ok((handle, join_handle))
    }

    /// Tick until cancelled.
    pub async fn run(mut self) {
        let worker = self.worker.take().map(HostWorker::spawn);

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("lifecycle loop started, ticking every {:?}", self.tick_interval);
        let _ = self.event_tx.send(LifecycleEvent::LoopStarted {
            tick_interval_ms: self.tick_interval.as_millis() as u64,
        });

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let TickOutcome::Ran(report) = self.run_once() {
                        if report.changed_anything() {
                            log::debug!(
                                "lifecycle tick ({}): +{} hot, -{} hot, {} frozen, {} discarded",
                                report.phase,
                                report.promoted,
                                report.demoted,
                                report.frozen,
                                report.discarded
                            );
                        }
                    }
                }
            }
        }

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::warn!("host worker ended abnormally: {}", e);
            }
        }

        log::info!("lifecycle loop stopped");
        let _ = self.event_tx.send(LifecycleEvent::LoopStopped);
    }
}

/// Cloneable control surface of a running [`LifecycleLoop`].
#[derive(Clone)]
pub struct LifecycleHandle {
    reconciler: Arc<Mutex<Reconciler>>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for LifecycleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHandle")
            .field("reconciler", &"Arc<Mutex<Reconciler>>")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl LifecycleHandle {
    pub fn snapshot(&self) -> LifecycleSnapshot {
        lock(&self.reconciler).snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Destroy the tab behind a shape that was deleted from the canvas.
    pub fn forget_shape(&self, shape_id: &ShapeId) -> bool {
        lock(&self.reconciler).forget_shape(shape_id)
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the loop after the tick in progress, if any.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityBoard;
    use crate::clock::ManualClock;
    use crate::config::LifecycleConfig;
    use crate::host::HostDispatch;
    use crate::ids::TabId;
    use crate::lifecycle::LifecycleState;
    use crate::testing::{RecordingHost, ScriptedCanvas};

    fn reconciler(config: LifecycleConfig, canvas: Arc<ScriptedCanvas>) -> (Reconciler, mpsc::UnboundedReceiver<HostCommand>) {
        let (dispatch, rx) = HostDispatch::channel();
        let reconciler = Reconciler::new(config, canvas, Arc::new(ActivityBoard::new()), dispatch).unwrap();
        (reconciler, rx)
    }

    #[test]
    fn run_once_skips_while_busy() {
        let canvas = ScriptedCanvas::new();
        let (reconciler, _rx) = reconciler(LifecycleConfig::default(), canvas);
        let lp = LifecycleLoop::new(reconciler.with_clock(Arc::new(ManualClock::new(0))));
        let mut events = lp.subscribe();

        let guard = lp.reconciler.lock().unwrap();
        assert_eq!(lp.run_once(), TickOutcome::Skipped);
        drop(guard);

        assert!(matches!(lp.run_once(), TickOutcome::Ran(_)));
        assert_eq!(events.try_recv().unwrap(), LifecycleEvent::TickSkipped);
    }

    #[test]
    fn start_needs_a_runtime() {
        let (reconciler, _rx) = reconciler(LifecycleConfig::default(), ScriptedCanvas::new());
        assert!(matches!(LifecycleLoop::new(reconciler).start(), Err(LifecycleError::NoRuntime)));
    }

    #[tokio::test]
    async fn loop_ticks_until_shutdown() {
        let canvas = ScriptedCanvas::new();
        canvas.put("s1", "t1", 400.0, 300.0, 1.0);
        let config = LifecycleConfig::builder().tick_interval_ms(5).build().unwrap();
        let (reconciler, rx) = reconciler(config, canvas);
        let host = Arc::new(RecordingHost::default());

        let lp = LifecycleLoop::new(reconciler).with_host_worker(host.clone(), rx);
        let mut events = lp.subscribe();
        let (handle, join) = lp.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.tab(&TabId::from("t1")).map(|t| t.state), Some(LifecycleState::Hot));
        assert_eq!(host.calls(), vec!["thaw(t1)", "show(t1)"]);

        handle.shutdown();
        join.await.unwrap();
        assert!(!handle.is_running());

        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::LoopStarted { tick_interval_ms: 5 });
        let mut last = None;
        while let Ok(ev) = events.try_recv() {
            last = Some(ev);
        }
        assert_eq!(last, Some(LifecycleEvent::LoopStopped));
    }

    #[tokio::test]
    async fn handle_forgets_shapes() {
        let canvas = ScriptedCanvas::new();
        canvas.put("s1", "t1", 400.0, 300.0, 1.0);
        let config = LifecycleConfig::builder().tick_interval_ms(5).build().unwrap();
        let (reconciler, mut rx) = reconciler(config, canvas.clone());

        let (handle, join) = LifecycleLoop::new(reconciler).start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(handle.forget_shape(&ShapeId::from("s1")));
        canvas.remove("s1");
        handle.shutdown();
        join.await.unwrap();

        let mut commands = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            commands.push(cmd.to_string());
        }
        assert_eq!(commands, vec!["thaw(t1)", "show(t1)", "hide(t1)", "destroy(t1)"]);
        assert!(handle.snapshot().tabs.is_empty());
    }
}
