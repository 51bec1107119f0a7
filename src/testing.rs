//! Scripted collaborators for unit tests.

use crate::activity::ActivityBoard;
use crate::canvas::{Camera, CanvasSource, TabInfo};
use crate::clock::ManualClock;
use crate::config::LifecycleConfig;
use crate::geometry::ShapeSample;
use crate::errors::HostError;
use crate::events::LifecycleObserver;
use crate::host::{BrowserHost, HostCommand, HostDispatch};
use crate::ids::{ShapeId, TabId};
use crate::lifecycle::LifecycleState;
use crate::reconcile::{Reconciler, TickReport};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct CanvasScript {
    zoom: f64,
    shapes: Vec<ShapeSample>,
    tabs: HashMap<ShapeId, TabId>,
}

/// Canvas whose shapes and camera are set by the test.
pub(crate) struct ScriptedCanvas {
    inner: Mutex<CanvasScript>,
}

impl ScriptedCanvas {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CanvasScript { zoom: 1.0, ..Default::default() }),
        })
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.inner.lock().unwrap().zoom = zoom;
    }

    /// Add or replace a shape backed by `tab`.
    pub fn put(&self, shape: &str, tab: &str, width: f64, height: f64, overlap: f64) {
        let mut inner = self.inner.lock().unwrap();
        let id = ShapeId::from(shape);
        inner.shapes.retain(|s| s.id != id);
        inner.shapes.push(ShapeSample::new(id.clone(), width, height, overlap));
        inner.tabs.insert(id, TabId::from(tab));
    }

    pub fn set_overlap(&self, shape: &str, overlap: f64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(s) = inner.shapes.iter_mut().find(|s| s.id.as_str() == shape) {
            s.overlap = overlap;
        }
    }

    /// Keep the shape on screen but drop its browser instance.
    pub fn unassign(&self, shape: &str) {
        self.inner.lock().unwrap().tabs.remove(&ShapeId::from(shape));
    }

    pub fn remove(&self, shape: &str) {
        let mut inner = self.inner.lock().unwrap();
        let id = ShapeId::from(shape);
        inner.shapes.retain(|s| s.id != id);
        inner.tabs.remove(&id);
    }
}

impl CanvasSource for ScriptedCanvas {
    fn visible_shapes(&self) -> Vec<ShapeSample> {
        self.inner.lock().unwrap().shapes.clone()
    }

    fn camera(&self) -> Camera {
        Camera { zoom: self.inner.lock().unwrap().zoom }
    }

    fn tab_info(&self, shape_id: &ShapeId) -> Option<TabInfo> {
        self.inner.lock().unwrap().tabs.get(shape_id).cloned().map(TabInfo::new)
    }
}

/// A reconciler wired to scripted collaborators and a manual clock.
pub(crate) struct Harness {
    pub reconciler: Reconciler,
    pub clock: ManualClock,
    pub canvas: Arc<ScriptedCanvas>,
    pub activity: Arc<ActivityBoard>,
    pub observed: Arc<Mutex<Vec<(ShapeId, LifecycleState)>>>,
    rx: mpsc::UnboundedReceiver<HostCommand>,
}

impl Harness {
    pub fn new(config: LifecycleConfig) -> Self {
        let clock = ManualClock::new(1_000);
        let canvas = ScriptedCanvas::new();
        let activity = Arc::new(ActivityBoard::new());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (dispatch, rx) = HostDispatch::channel();

        let sink = observed.clone();
        let reconciler = Reconciler::new(config, canvas.clone(), activity.clone(), dispatch)
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
            .with_observer(Arc::new(move |shape: &ShapeId, state: LifecycleState| {
                sink.lock().unwrap().push((shape.clone(), state));
            }));

        Self { reconciler, clock, canvas, activity, observed, rx }
    }

    /// Swap the recording observer for another one.
    pub fn with_observer(self, observer: Arc<dyn LifecycleObserver>) -> Self {
        Self { reconciler: self.reconciler.with_observer(observer), ..self }
    }

    pub fn tick_after(&mut self, ms: u64) -> TickReport {
        self.clock.advance(ms);
        self.reconciler.tick()
    }

    /// Host commands queued since the last drain.
    pub fn drain(&mut self) -> Vec<HostCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    pub fn close_host(&mut self) {
        self.rx.close();
    }
}

/// Host that accepts every command and records it.
#[derive(Default)]
pub(crate) struct RecordingHost {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, cmd: HostCommand) -> BoxFuture<'static, Result<(), HostError>> {
        self.calls.lock().unwrap().push(cmd.to_string());
        Box::pin(async { Ok(()) })
    }
}

impl BrowserHost for RecordingHost {
    fn show(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.record(HostCommand::Show(tab_id))
    }
    fn hide(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.record(HostCommand::Hide(tab_id))
    }
    fn freeze(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.record(HostCommand::Freeze(tab_id))
    }
    fn thaw(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.record(HostCommand::Thaw(tab_id))
    }
    fn destroy(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.record(HostCommand::Destroy(tab_id))
    }
}
