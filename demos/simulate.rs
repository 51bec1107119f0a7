//! Drives the lifecycle loop against a simulated canvas.
//!
//! A grid of browser shapes is laid out in page space; the camera wanders over it,
//! alternating pans, zooms and pauses. Host commands are only logged.
//!
//!     RUST_LOG=tab_lifecycle=debug cargo run --example simulate

use anyhow::Result;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tab_lifecycle::geometry::sample_bounds;
use tab_lifecycle::*;
use url::Url;

const GRID: usize = 6;
const SHAPE_W: f64 = 800.0;
const SHAPE_H: f64 = 600.0;
const GAP: f64 = 200.0;
const VIEWPORT_W: f64 = 1600.0;
const VIEWPORT_H: f64 = 1000.0;

struct Camera2d {
    x: f64,
    y: f64,
    zoom: f64,
}

struct SimCanvas {
    shapes: Vec<ShapeBounds>,
    camera: Mutex<Camera2d>,
}

impl SimCanvas {
    fn new() -> Self {
        let mut shapes = Vec::new();
        for row in 0..GRID {
            for col in 0..GRID {
                shapes.push(ShapeBounds {
                    id: ShapeId::from(format!("shape-{row}-{col}")),
                    bounds: Rect::new(col as f64 * (SHAPE_W + GAP), row as f64 * (SHAPE_H + GAP), SHAPE_W, SHAPE_H),
                });
            }
        }

        Self {
            shapes,
            camera: Mutex::new(Camera2d { x: 0.0, y: 0.0, zoom: 1.0 }),
        }
    }

    fn pan_by(&self, dx: f64, dy: f64) {
        let mut cam = self.camera.lock().unwrap_or_else(|p| p.into_inner());
        cam.x += dx / cam.zoom;
        cam.y += dy / cam.zoom;
    }

    fn zoom_by(&self, factor: f64) {
        let mut cam = self.camera.lock().unwrap_or_else(|p| p.into_inner());
        cam.zoom = (cam.zoom * factor).clamp(0.1, 4.0);
    }
}

impl CanvasSource for SimCanvas {
    fn visible_shapes(&self) -> Vec<ShapeSample> {
        let cam = self.camera.lock().unwrap_or_else(|p| p.into_inner());
        let viewport = Rect::new(cam.x, cam.y, VIEWPORT_W / cam.zoom, VIEWPORT_H / cam.zoom);
        sample_bounds(&self.shapes, &viewport, cam.zoom)
            .into_iter()
            .filter(|s| s.overlap > 0.0)
            .collect()
    }

    fn camera(&self) -> Camera {
        let cam = self.camera.lock().unwrap_or_else(|p| p.into_inner());
        Camera { zoom: cam.zoom }
    }

    fn tab_info(&self, shape_id: &ShapeId) -> Option<TabInfo> {
        let url = Url::parse(&format!("https://example.org/{}", shape_id)).ok()?;
        Some(TabInfo::new(format!("tab-{}", shape_id.as_str().trim_start_matches("shape-"))).with_url(url))
    }
}

struct LoggingHost;

impl LoggingHost {
    fn log(&self, cmd: HostCommand) -> BoxFuture<'static, Result<(), HostError>> {
        Box::pin(async move {
            log::info!("host: {}", cmd);
            Ok(())
        })
    }
}

impl BrowserHost for LoggingHost {
    fn show(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.log(HostCommand::Show(tab_id))
    }
    fn hide(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.log(HostCommand::Hide(tab_id))
    }
    fn freeze(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.log(HostCommand::Freeze(tab_id))
    }
    fn thaw(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.log(HostCommand::Thaw(tab_id))
    }
    fn destroy(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>> {
        self.log(HostCommand::Destroy(tab_id))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Short timers so freezing and discarding show up within the run
    let config = LifecycleConfig::builder()
        .freeze_hidden_ms(1_500)
        .discard_hidden_ms(4_000)
        .build()?;

    let canvas = Arc::new(SimCanvas::new());
    let activity = Arc::new(ActivityBoard::new());
    activity.set_flag(&ShapeId::from("shape-5-5"), TabFlags::AUDIBLE, true);

    let (dispatch, commands) = HostDispatch::channel();
    let reconciler = Reconciler::new(config, canvas.clone(), activity.clone(), dispatch)?
        .with_observer(Arc::new(|shape: &ShapeId, state: LifecycleState| {
            log::debug!("badge {} -> {}", shape, state);
        }));

    let (handle, join) = LifecycleLoop::new(reconciler)
        .with_host_worker(Arc::new(LoggingHost), commands)
        .start()?;

    let mut rng = StdRng::seed_from_u64(42);
    let origin = MonotonicClock::new();

    for round in 0..8 {
        if rng.random_bool(0.6) {
            let (dx, dy) = (rng.random_range(-60.0..60.0), rng.random_range(-40.0..40.0));
            log::info!("round {}: panning", round);
            for _ in 0..20 {
                canvas.pan_by(dx, dy);
                tokio::time::sleep(Duration::from_millis(16)).await;
            }
        } else {
            let factor = if rng.random_bool(0.5) { 0.97 } else { 1.03 };
            log::info!("round {}: zooming", round);
            for _ in 0..20 {
                canvas.zoom_by(factor);
                tokio::time::sleep(Duration::from_millis(16)).await;
            }
        }

        // Interacting with whatever sits in the middle of the screen
        if let Some(sample) = canvas.visible_shapes().into_iter().max_by(|a, b| a.overlap.total_cmp(&b.overlap)) {
            activity.record_interaction(&sample.id, origin.now_ms().max(1));
        }

        tokio::time::sleep(Duration::from_millis(rng.random_range(200..1_200))).await;
    }

    let snapshot = handle.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    log::info!(
        "{} hot, {} warm, {} frozen",
        snapshot.count(LifecycleState::Hot),
        snapshot.count(LifecycleState::Warm),
        snapshot.count(LifecycleState::Frozen)
    );

    handle.shutdown();
    join.await?;
    Ok(())
}
