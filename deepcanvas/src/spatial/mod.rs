//! Quad-tree spatial index over drawing primitives.
//!
//! Built once per drawing, immutable afterwards. Viewport and hit-test
//! queries prune whole subtrees by bounds; a primitive straddling a split
//! line is deliberately duplicated into every intersecting child
//! (broad-phase over-approximation - geometry is never clipped), so a rect
//! query can never omit a primitive that actually intersects it.

mod index;

pub use index::{SpatialIndex, SpatialNode};
