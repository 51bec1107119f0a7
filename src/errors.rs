use crate::host::HostCommand;

/// Validation failures for [`LifecycleConfig`](crate::config::LifecycleConfig).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("tiny_px_floor must be a finite number > 0 (got {0})")]
    InvalidTinyPxFloor(f64),

    #[error("overview_zoom_cutoff must be a finite number > 0 (got {0})")]
    InvalidOverviewCutoff(f64),

    #[error("zoom_epsilon must be a finite number >= 0 (got {0})")]
    InvalidZoomEpsilon(f64),

    #[error("strong_visibility_factor must be a finite number >= 1 (got {0})")]
    InvalidStrongFactor(f64),

    #[error("tick_interval_ms must be at least 1")]
    ZeroTickInterval,
}

/// A host command that did not complete. These never leave the host worker;
/// the next reconciliation re-issues whatever is still needed.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host rejected {command}: {reason}")]
    Rejected { command: HostCommand, reason: String },

    #[error("browser host is unavailable")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("cannot parse lifecycle configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lifecycle loop must be started from within a tokio runtime")]
    NoRuntime,

    #[error("channel closed")]
    ChannelClosed,
}
