/// Pipeline layer
///
/// This module handles everything around executing an edit:
/// - The edit recipe itself (preset.rs)
/// - Undo/redo snapshots (history.rs)
/// - Pooled working buffers (cache.rs)
/// - The background render queue (render.rs)

pub mod cache;
pub mod history;
pub mod preset;
pub mod render;
