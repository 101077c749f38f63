/// edit-pipeline: the engine of a non-destructive photo editor.
///
/// An edit is an ordered list of filter representations (an `ImagePreset`).
/// Rendering folds the preset over a source bitmap, one filter at a time.
/// Interactive previews go through a single background worker (`RenderQueue`)
/// with latest-wins supersession; undo/redo snapshots live in
/// `HistoryManager`; working buffers are pooled in `BitmapCache`.
pub mod error;
pub mod filters;
pub mod pipeline;

/// Working pixel buffer for every pipeline stage (8-bit RGBA).
pub type Bitmap = image::RgbaImage;

pub use error::PipelineError;
pub use filters::geometry::{GeometryData, Mirror, Rect, Rotation};
pub use filters::representation::{FilterParams, FilterRepresentation, FilterType};
pub use pipeline::cache::{BitmapCache, BufferKind};
pub use pipeline::history::HistoryManager;
pub use pipeline::preset::ImagePreset;
pub use pipeline::render::{
    CallerId, CallerRegistry, RenderQueue, RenderingPurpose, RenderingRequestCaller,
    RenderingResult,
};
