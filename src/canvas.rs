use crate::geometry::ShapeSample;
use crate::ids::{ShapeId, TabId};
use url::Url;

/// Camera state of the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { zoom: 1.0 }
    }
}

/// The browser tab assigned to a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TabInfo {
    pub tab_id: TabId,
    pub url: Option<Url>,
}

impl TabInfo {
    pub fn new(tab_id: impl Into<TabId>) -> Self {
        Self { tab_id: tab_id.into(), url: None }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }
}

/// What the lifecycle loop polls from the canvas framework every tick.
pub trait CanvasSource: Send + Sync {
    /// Shapes currently rendered in or near the viewport.
    fn visible_shapes(&self) -> Vec<ShapeSample>;

    fn camera(&self) -> Camera;

    /// `None` when the shape is not browser-backed or has no tab assigned yet.
    fn tab_info(&self, shape: &ShapeId) -> Option<TabInfo>;
}
