/// Filter layer
///
/// This module handles everything about a single transform:
/// - Describing it (representation.rs: identity, flags, parameters)
/// - Geometry state and composition rules (geometry.rs)
/// - Executing it against a pixel buffer (apply.rs)

pub mod apply;
pub mod geometry;
pub mod representation;
