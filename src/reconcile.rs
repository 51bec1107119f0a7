//! The reconciliation pass.
//!
//! One call to [`Reconciler::tick`] is one atomic pass over the canvas:
//!
//! 1. read the camera and the rendered shapes, drop slivers,
//! 2. feed zoom and pan signature to the [`MotionDetector`],
//! 3. depending on the motion phase:
//!    - zoom-active: change nothing at all,
//!    - pan-active: demote hot tabs that went off-screen, promote at most one tab,
//!    - idle: compute the desired-hot set, demote what is not in it, promote what
//!      is missing, then advance the hidden timers and freeze/discard.
//!
//! Elevated tabs (audible, capturing, devtools, downloads, pinned) are never
//! demoted, frozen or discarded. Host commands and observer notifications are
//! collected during the pass and flushed after it, so the host sees the commands
//! of a tick in the order they were decided.

use crate::activity::ActivityOracle;
use crate::admission::{self, Candidate, ZoomRegime};
use crate::canvas::CanvasSource;
use crate::clock::{Clock, Millis, MonotonicClock};
use crate::config::LifecycleConfig;
use crate::errors::LifecycleError;
use crate::events::{LifecycleEvent, LifecycleObserver, NoopObserver};
use crate::geometry::{self, VisibleShape};
use crate::host::HostDispatch;
use crate::ids::{ShapeId, TabId};
use crate::lifecycle::{LifecycleState, TabRegister, TabSnapshot, TickEffects};
use crate::motion::{MotionDetector, MotionPhase};
use serde::Serialize;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub at: Millis,
    pub phase: MotionPhase,
    /// Shapes above the visibility floor.
    pub visible: usize,
    pub promoted: usize,
    pub demoted: usize,
    pub frozen: usize,
    pub discarded: usize,
}

impl TickReport {
    fn new(at: Millis, phase: MotionPhase, visible: usize) -> Self {
        Self { at, phase, visible, promoted: 0, demoted: 0, frozen: 0, discarded: 0 }
    }

    pub fn changed_anything(&self) -> bool {
        self.promoted + self.demoted + self.frozen + self.discarded > 0
    }
}

/// Serializable view of the register, for debugging overlays and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleSnapshot {
    pub at: Option<Millis>,
    pub phase: Option<MotionPhase>,
    pub tabs: Vec<TabSnapshot>,
    /// Destroyed tab ids the canvas still reports.
    pub tombstones: usize,
}

impl LifecycleSnapshot {
    pub fn tab(&self, tab_id: &TabId) -> Option<&TabSnapshot> {
        self.tabs.iter().find(|t| &t.tab_id == tab_id)
    }

    pub fn count(&self, state: LifecycleState) -> usize {
        self.tabs.iter().filter(|t| t.state == state).count()
    }
}

pub struct Reconciler {
    config: LifecycleConfig,
    canvas: Arc<dyn CanvasSource>,
    activity: Arc<dyn ActivityOracle>,
    clock: Arc<dyn Clock>,
    host: HostDispatch,
    observer: Arc<dyn LifecycleObserver>,
    event_tx: broadcast::Sender<LifecycleEvent>,

    register: TabRegister,
    motion: MotionDetector,
    last_tick_at: Option<Millis>,
    last_phase: Option<MotionPhase>,
}

impl Reconciler {
    pub fn new(
        config: LifecycleConfig,
        canvas: Arc<dyn CanvasSource>,
        activity: Arc<dyn ActivityOracle>,
        host: HostDispatch,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            canvas,
            activity,
            clock: Arc::new(MonotonicClock::new()),
            host,
            observer: Arc::new(NoopObserver),
            event_tx,
            register: TabRegister::new(),
            motion: MotionDetector::new(),
            last_tick_at: None,
            last_phase: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.event_tx.clone()
    }

    pub fn state_of(&self, tab_id: &TabId) -> Option<LifecycleState> {
        self.register.state_of(tab_id)
    }

    /// Tab currently tracked for a shape; `None` once it has been discarded.
    pub fn tab_for_shape(&self, shape_id: &ShapeId) -> Option<&TabId> {
        self.register.tab_for_shape(shape_id)
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            at: self.last_tick_at,
            phase: self.last_phase,
            tabs: self.register.snapshot(),
            tombstones: self.register.tombstone_count(),
        }
    }

    /// Run one reconciliation pass.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now_ms();
        let zoom = self.canvas.camera().zoom;
        let samples = self.canvas.visible_shapes();
        let visible = geometry::measure(&samples, self.config.tiny_px_floor);

        let phase = self.motion.observe(now, zoom, &visible, &self.config);
        let idle_delta = self.last_tick_at.map_or(0, |prev| now.saturating_sub(prev));
        self.last_tick_at = Some(now);
        self.last_phase = Some(phase);

        log::trace!("lifecycle tick at {}: {} ({} visible, zoom {:.3})", now, phase, visible.len(), zoom);

        let mut report = TickReport::new(now, phase, visible.len());
        let mut fx = TickEffects::default();
        let regime = if self.config.is_overview(zoom) {
            ZoomRegime::Overview
        } else {
            ZoomRegime::Normal
        };

        match phase {
            MotionPhase::ZoomActive => {}
            MotionPhase::PanActive => {
                let candidates = self.candidates(&visible, now);
                self.reconcile_pan(&candidates, regime, now, &mut fx, &mut report);
            }
            MotionPhase::Idle => {
                let candidates = self.candidates(&visible, now);
                self.reconcile_idle(&candidates, regime, now, &mut fx, &mut report);
                self.advance_hidden_timers(idle_delta, now, &mut fx, &mut report);
                self.sweep_tombstones();
            }
        }

        self.flush(fx, phase);
        report
    }

    /// Tear down the tab of a shape that was removed from the canvas, whatever its state.
    pub fn forget_shape(&mut self, shape_id: &ShapeId) -> bool {
        let Some(tab_id) = self.register.tab_for_shape(shape_id).cloned() else {
            return false;
        };

        let mut fx = TickEffects::default();
        let removed = self.register.remove(&tab_id, &mut fx);
        let phase = self.last_phase.unwrap_or(MotionPhase::Idle);
        self.flush(fx, phase);
        removed
    }

    /// Resolve visible shapes to browser-backed candidates.
    fn candidates(&mut self, visible: &[VisibleShape], now: Millis) -> Vec<Candidate> {
        let mut seen: HashSet<TabId> = HashSet::new();
        let mut out = Vec::with_capacity(visible.len());

        for shape in visible {
            let Some(info) = self.canvas.tab_info(&shape.id) else {
                continue;
            };
            if self.register.is_discarded(&info.tab_id) || !seen.insert(info.tab_id.clone()) {
                continue;
            }

            self.register.mark_visible(&info.tab_id, now);
            out.push(Candidate {
                shape_id: shape.id.clone(),
                tab_id: info.tab_id,
                visible_px: shape.visible_px,
                flags: self.activity.flags(&shape.id),
                last_interaction: self.activity.last_interaction_ms(&shape.id),
            });
        }

        out
    }

    fn is_elevated(&self, shape_id: &ShapeId) -> bool {
        self.activity.flags(shape_id).is_elevated()
    }

    fn reconcile_pan(
        &mut self,
        candidates: &[Candidate],
        regime: ZoomRegime,
        now: Millis,
        fx: &mut TickEffects,
        report: &mut TickReport,
    ) {
        let on_screen: HashSet<&TabId> = candidates.iter().map(|c| &c.tab_id).collect();

        for (tab_id, shape_id) in self.register.hot_tabs() {
            if on_screen.contains(&tab_id) || self.is_elevated(&shape_id) {
                continue;
            }
            if self.register.demote(&tab_id, now, fx) {
                report.demoted += 1;
            }
        }

        if regime == ZoomRegime::Overview {
            return;
        }

        let register = &self.register;
        let pick = admission::pan_candidate(candidates, |t| register.is_hot(t), self.config.strong_px());
        if let Some(c) = pick {
            if self.register.promote(&c.tab_id, &c.shape_id, now, fx) {
                report.promoted += 1;
            }
        }
    }

    fn reconcile_idle(
        &mut self,
        candidates: &[Candidate],
        regime: ZoomRegime,
        now: Millis,
        fx: &mut TickEffects,
        report: &mut TickReport,
    ) {
        let desired = admission::desired_hot(candidates, regime, self.config.hot_cap_overview);
        let desired_ids: HashSet<&TabId> = desired.iter().map(|c| &c.tab_id).collect();

        for (tab_id, shape_id) in self.register.hot_tabs() {
            if desired_ids.contains(&tab_id) || self.is_elevated(&shape_id) {
                continue;
            }
            if self.register.demote(&tab_id, now, fx) {
                report.demoted += 1;
            }
        }

        for c in desired {
            if self.register.promote(&c.tab_id, &c.shape_id, now, fx) {
                report.promoted += 1;
            }
        }
    }

    /// Add the idle time since the previous tick to every hidden, non-elevated tab
    /// and freeze or discard the ones that crossed a threshold.
    fn advance_hidden_timers(&mut self, delta: Millis, now: Millis, fx: &mut TickEffects, report: &mut TickReport) {
        for (tab_id, shape_id) in self.register.hidden_tabs() {
            if self.is_elevated(&shape_id) {
                continue;
            }
            // Demoted during this very tick
            if self.register.get(&tab_id).and_then(|t| t.hidden_since) == Some(now) {
                continue;
            }

            let Some(hidden_for) = self.register.advance_hidden(&tab_id, delta) else {
                continue;
            };

            if hidden_for >= self.config.discard_hidden_ms {
                if self.register.discard(&tab_id, fx) {
                    report.discarded += 1;
                }
            } else if hidden_for >= self.config.freeze_hidden_ms && self.register.freeze(&tab_id, fx) {
                report.frozen += 1;
            }
        }
    }

    /// Drop tombstones whose shape is gone or has been assigned a new tab.
    fn sweep_tombstones(&mut self) {
        if self.register.tombstone_count() == 0 {
            return;
        }

        let canvas = &self.canvas;
        let dropped = self
            .register
            .retain_tombstones(|tab_id, shape_id| canvas.tab_info(shape_id).is_some_and(|info| &info.tab_id == tab_id));
        if dropped > 0 {
            log::debug!("forgot {} discarded tab ids no longer reported by the canvas", dropped);
        }
    }

    fn flush(&mut self, fx: TickEffects, phase: MotionPhase) {
        for cmd in fx.commands {
            let label = cmd.to_string();
            if let Err(e) = self.host.send(cmd) {
                log::warn!("cannot queue host command {}: {}", label, e);
            }
        }

        for change in fx.changes {
            let observer = &self.observer;
            let notified = panic::catch_unwind(AssertUnwindSafe(|| observer.set_lifecycle(&change.shape_id, change.to)));
            if notified.is_err() {
                log::warn!("lifecycle observer panicked for shape {} ({})", change.shape_id, change.to);
            }
            // No subscribers is fine
            let _ = self.event_tx.send(LifecycleEvent::StateChanged {
                tab_id: change.tab_id,
                shape_id: change.shape_id,
                from: change.from,
                to: change.to,
                phase,
            });
        }
    }
}
