//! Motion detection for the canvas camera.
//!
//! The detector remembers the last zoom value and the last pan signature, and the
//! time each of them last changed. A tick is classified as:
//!
//! - [`MotionPhase::ZoomActive`] while the zoom changed less than `zoom_idle_ms` ago,
//! - [`MotionPhase::PanActive`] while the pan signature changed less than `pan_idle_ms` ago,
//! - [`MotionPhase::Idle`] otherwise.
//!
//! Zoom takes precedence over pan. The first observation only seeds the detector:
//! a loop that starts on a still canvas starts idle.
//!
//! The pan signature is a hash-weighted sum over the visible shapes and their
//! overlap. It can collide for different layouts; that only delays the idle
//! classification by a tick, which is acceptable.

use crate::clock::Millis;
use crate::config::LifecycleConfig;
use crate::geometry::VisibleShape;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPhase {
    /// The user is zooming, nothing may change.
    ZoomActive,
    /// The user is panning, only the restricted fast path runs.
    PanActive,
    /// Camera is still, full reconciliation.
    Idle,
}

impl Display for MotionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotionPhase::ZoomActive => write!(f, "zoom-active"),
            MotionPhase::PanActive => write!(f, "pan-active"),
            MotionPhase::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MotionDetector {
    zoom: Option<f64>,
    zoom_changed_at: Option<Millis>,
    signature: Option<u64>,
    pan_changed_at: Option<Millis>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this tick's camera state and classify it.
    pub fn observe(&mut self, now: Millis, zoom: f64, visible: &[VisibleShape], config: &LifecycleConfig) -> MotionPhase {
        self.observe_zoom(now, zoom, config.zoom_epsilon);
        self.observe_signature(now, pan_signature(visible));
        self.classify(now, config)
    }

    /// Returns true when the zoom moved by more than `epsilon` since the last recorded value.
    pub fn observe_zoom(&mut self, now: Millis, zoom: f64, epsilon: f64) -> bool {
        if !zoom.is_finite() {
            return false;
        }

        match self.zoom {
            None => {
                self.zoom = Some(zoom);
                false
            }
            Some(prev) if (zoom - prev).abs() > epsilon => {
                self.zoom = Some(zoom);
                self.zoom_changed_at = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    /// Returns true when the signature differs from the previous tick's.
    pub fn observe_signature(&mut self, now: Millis, signature: u64) -> bool {
        let changed = matches!(self.signature, Some(prev) if prev != signature);
        if changed {
            self.pan_changed_at = Some(now);
        }
        self.signature = Some(signature);
        changed
    }

    pub fn classify(&self, now: Millis, config: &LifecycleConfig) -> MotionPhase {
        if within(self.zoom_changed_at, now, config.zoom_idle_ms) {
            MotionPhase::ZoomActive
        } else if within(self.pan_changed_at, now, config.pan_idle_ms) {
            MotionPhase::PanActive
        } else {
            MotionPhase::Idle
        }
    }

    /// Last recorded zoom value.
    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }
}

fn within(changed_at: Option<Millis>, now: Millis, window_ms: u64) -> bool {
    changed_at.is_some_and(|at| now.saturating_sub(at) < window_ms)
}

/// Order-independent signature of the visible set.
pub fn pan_signature(visible: &[VisibleShape]) -> u64 {
    visible.iter().fold(0u64, |acc, shape| {
        let weight = (shape.overlap.clamp(0.0, 1.0) * 1000.0).round() as u64 + 1;
        acc.wrapping_add(fnv1a(shape.id.as_str().as_bytes()).wrapping_mul(weight))
    })
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ShapeId;

    fn shape(id: &str, overlap: f64) -> VisibleShape {
        VisibleShape { id: ShapeId::from(id), overlap, visible_px: 10_000.0 }
    }

    #[test]
    fn signature_ignores_order_but_not_overlap() {
        let a = vec![shape("a", 1.0), shape("b", 0.5)];
        let b = vec![shape("b", 0.5), shape("a", 1.0)];
        let c = vec![shape("a", 1.0), shape("b", 0.4)];

        assert_eq!(pan_signature(&a), pan_signature(&b));
        assert_ne!(pan_signature(&a), pan_signature(&c));
        assert_eq!(pan_signature(&[]), 0);
    }

    #[test]
    fn first_observation_only_seeds() {
        let cfg = LifecycleConfig::default();
        let mut detector = MotionDetector::new();
        let phase = detector.observe(1_000, 1.0, &[shape("a", 1.0)], &cfg);
        assert_eq!(phase, MotionPhase::Idle);
        assert_eq!(detector.zoom(), Some(1.0));
    }

    #[test]
    fn zoom_change_is_active_for_the_idle_window() {
        let cfg = LifecycleConfig::default();
        let mut detector = MotionDetector::new();
        detector.observe(0, 1.0, &[], &cfg);

        assert_eq!(detector.observe(100, 1.2, &[], &cfg), MotionPhase::ZoomActive);
        assert_eq!(detector.observe(189, 1.2, &[], &cfg), MotionPhase::ZoomActive);
        assert_eq!(detector.observe(190, 1.2, &[], &cfg), MotionPhase::Idle);
    }

    #[test]
    fn zoom_jitter_below_epsilon_is_ignored() {
        let cfg = LifecycleConfig::default();
        let mut detector = MotionDetector::new();
        detector.observe(0, 1.0, &[], &cfg);
        assert_eq!(detector.observe(500, 1.0005, &[], &cfg), MotionPhase::Idle);
        assert_eq!(detector.zoom(), Some(1.0));
    }

    #[test]
    fn zoom_wins_over_pan() {
        let cfg = LifecycleConfig::default();
        let mut detector = MotionDetector::new();
        detector.observe(0, 1.0, &[shape("a", 1.0)], &cfg);
        assert_eq!(detector.observe(500, 0.8, &[shape("a", 0.5)], &cfg), MotionPhase::ZoomActive);
    }

    #[test]
    fn pan_change_is_active_for_the_idle_window() {
        let cfg = LifecycleConfig::default();
        let mut detector = MotionDetector::new();
        detector.observe(0, 1.0, &[shape("a", 1.0)], &cfg);

        assert_eq!(detector.observe(100, 1.0, &[shape("a", 0.7)], &cfg), MotionPhase::PanActive);
        assert_eq!(detector.observe(159, 1.0, &[shape("a", 0.7)], &cfg), MotionPhase::PanActive);
        assert_eq!(detector.observe(160, 1.0, &[shape("a", 0.7)], &cfg), MotionPhase::Idle);
    }

    #[test]
    fn non_finite_zoom_is_not_a_change() {
        let mut detector = MotionDetector::new();
        assert!(!detector.observe_zoom(0, 1.0, 1e-3));
        assert!(!detector.observe_zoom(10, f64::NAN, 1e-3));
        assert_eq!(detector.zoom(), Some(1.0));
    }
}
