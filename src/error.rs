/// Crate-wide error type.
///
/// One enum instead of per-module string errors, so callers can match on
/// what actually went wrong. Cancellation (a superseded or detached
/// request) is deliberately NOT an error: late results are dropped
/// silently and the caller simply never hears back for that sequence.
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Buffer allocation failed (zero-sized or over the allocator limit).
    #[error("bitmap allocation failed for {width}x{height}")]
    Allocation { width: u32, height: u32 },

    /// A filter step aborted; the whole in-flight render is discarded.
    #[error("filter '{name}' failed: {reason}")]
    FilterFailed { name: String, reason: String },

    /// A geometry filter produced an empty output region.
    #[error("crop produced an empty region")]
    InvalidCrop,

    /// The render worker is gone (its channel hung up).
    #[error("render queue disconnected")]
    QueueDisconnected,

    /// A bounded synchronous render did not finish in time.
    #[error("render timed out after {0:?}")]
    RenderTimeout(Duration),

    /// Preset/representation JSON could not be parsed at all.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Joining a detached render task failed.
    #[error("background render task failed: {0}")]
    WorkerJoin(String),
}
