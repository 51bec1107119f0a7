//! Lifecycle configuration.
//!
//! `LifecycleConfig` holds every tunable of the tab lifecycle loop: capacity of
//! the overview mode, the visibility floor, the hidden-time thresholds for
//! freezing and discarding, and the motion debounce windows.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use tab_lifecycle::LifecycleConfig;
//! let cfg = LifecycleConfig::default();
//! assert_eq!(cfg.hot_cap_overview, 6);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use tab_lifecycle::LifecycleConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LifecycleConfig::builder()
//!     .hot_cap_overview(4)
//!     .tiny_px_floor(2_000.0)
//!     .freeze_hidden_ms(30_000)
//!     .discard_hidden_ms(120_000)
//!     .build()?; // returns Result<LifecycleConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! ## Load from JSON
//!
//! Every field is required when loading from JSON; unknown fields are rejected.
//!
//! # Errors
//!
//! Validation returns a [`ConfigError`] for a non-positive visibility floor or
//! overview cutoff, a zero tick interval, or non-finite factors.
//! `freeze_hidden_ms < discard_hidden_ms` is expected but not enforced; a config
//! that violates it only logs a warning (tabs then go straight to discarded).

use crate::errors::{ConfigError, LifecycleError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Max number of non-elevated hot tabs while in overview mode.
    pub hot_cap_overview: usize,
    /// Shapes with fewer visible pixels than this are treated as invisible.
    pub tiny_px_floor: f64,
    /// Hidden time after which a warm tab gets frozen.
    pub freeze_hidden_ms: u64,
    /// Hidden time after which a warm or frozen tab gets destroyed.
    pub discard_hidden_ms: u64,
    /// Zoom levels at or below this value are overview mode.
    pub overview_zoom_cutoff: f64,
    /// Time without pan-signature changes before the canvas counts as still.
    pub pan_idle_ms: u64,
    /// Time without zoom changes before the canvas counts as still.
    pub zoom_idle_ms: u64,
    /// Cadence of the reconciliation loop.
    pub tick_interval_ms: u64,
    /// Zoom deltas at or below this are not a zoom change.
    pub zoom_epsilon: f64,
    /// Multiple of `tiny_px_floor` a shape needs to be promoted while panning.
    pub strong_visibility_factor: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hot_cap_overview: 6,
            tiny_px_floor: 1_000.0,
            freeze_hidden_ms: 60_000,
            discard_hidden_ms: 300_000,
            overview_zoom_cutoff: 0.45,
            pan_idle_ms: 60,
            zoom_idle_ms: 90,
            tick_interval_ms: 30,
            zoom_epsilon: 1e-3,
            strong_visibility_factor: 8.0,
        }
    }
}

impl LifecycleConfig {
    pub fn builder() -> LifecycleConfigBuilder {
        LifecycleConfigBuilder::default()
    }

    /// Parse and validate a JSON document. All fields must be present.
    pub fn from_json(json: &str) -> Result<Self, LifecycleError> {
        let config: LifecycleConfig = serde_json::from_str(json)?;
        validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }

    /// Visible-pixel estimate above which a shape may be promoted during a pan.
    pub fn strong_px(&self) -> f64 {
        self.tiny_px_floor * self.strong_visibility_factor
    }

    pub fn is_overview(&self, zoom: f64) -> bool {
        zoom <= self.overview_zoom_cutoff
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Builder for [`LifecycleConfig`], starting from the defaults.
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfigBuilder {
    inner: LifecycleConfig,
}

impl LifecycleConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut LifecycleConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn hot_cap_overview(self, n: usize) -> Self { self.map(|c| c.hot_cap_overview = n) }
    pub fn tiny_px_floor(self, px: f64) -> Self { self.map(|c| c.tiny_px_floor = px) }
    pub fn freeze_hidden_ms(self, ms: u64) -> Self { self.map(|c| c.freeze_hidden_ms = ms) }
    pub fn discard_hidden_ms(self, ms: u64) -> Self { self.map(|c| c.discard_hidden_ms = ms) }
    pub fn overview_zoom_cutoff(self, zoom: f64) -> Self { self.map(|c| c.overview_zoom_cutoff = zoom) }
    pub fn pan_idle_ms(self, ms: u64) -> Self { self.map(|c| c.pan_idle_ms = ms) }
    pub fn zoom_idle_ms(self, ms: u64) -> Self { self.map(|c| c.zoom_idle_ms = ms) }
    pub fn tick_interval_ms(self, ms: u64) -> Self { self.map(|c| c.tick_interval_ms = ms) }
    pub fn zoom_epsilon(self, eps: f64) -> Self { self.map(|c| c.zoom_epsilon = eps) }
    pub fn strong_visibility_factor(self, factor: f64) -> Self { self.map(|c| c.strong_visibility_factor = factor) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut LifecycleConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<LifecycleConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

fn validate(c: &LifecycleConfig) -> Result<(), ConfigError> {
    if !c.tiny_px_floor.is_finite() || c.tiny_px_floor <= 0.0 {
        return Err(ConfigError::InvalidTinyPxFloor(c.tiny_px_floor));
    }
    if !c.overview_zoom_cutoff.is_finite() || c.overview_zoom_cutoff <= 0.0 {
        return Err(ConfigError::InvalidOverviewCutoff(c.overview_zoom_cutoff));
    }
    if !c.zoom_epsilon.is_finite() || c.zoom_epsilon < 0.0 {
        return Err(ConfigError::InvalidZoomEpsilon(c.zoom_epsilon));
    }
    if !c.strong_visibility_factor.is_finite() || c.strong_visibility_factor < 1.0 {
        return Err(ConfigError::InvalidStrongFactor(c.strong_visibility_factor));
    }
    if c.tick_interval_ms == 0 {
        return Err(ConfigError::ZeroTickInterval);
    }
    if c.freeze_hidden_ms >= c.discard_hidden_ms {
        log::warn!(
            "freeze_hidden_ms ({}) >= discard_hidden_ms ({}); hidden tabs will be discarded without freezing first",
            c.freeze_hidden_ms,
            c.discard_hidden_ms
        );
    }
    Ok(())
}
