//! Geometry primitives for drawing, device and pixel spaces.
//!
//! Everything in the tile pipeline hangs off three coordinate spaces:
//!
//! - **drawing space** - the f64 space the document's primitives live in
//!   ([`DrawRect`], [`DrawPoint`])
//! - **pixel space** - integer device pixels at a given zoom ([`PixelRect`])
//! - the affine mapping between the two ([`Transform`])
//!
//! All rectangles are **half-open**: a rect covers `[min, max)` on both
//! axes. Two rects that merely touch along an edge do not intersect, and a
//! point exactly on a quadrant split line belongs to exactly one quadrant.
//! This single rule is applied uniformly across the spatial index and the
//! tile tree so that quadrants stay disjoint by construction.
//!
//! Subdivision never halves an already-halved value. [`DrawRect::grid_cell`]
//! and [`PixelRect::grid_cell`] compute any cell of a `divisions x divisions`
//! grid directly from the top-level rectangle, so sibling cells at any depth
//! share bit-identical boundaries and partition their parent exactly.

mod types;


pub use types::{DrawPoint, DrawRect, PixelRect, Transform};

/// Number of decimal places zoom values are rounded to.
///
/// Zoom is `factor^step`; rounding every computed value to a fixed precision
/// makes repeated floating computations converge on identical cache keys
/// instead of drifting apart.
pub const ZOOM_DECIMALS: u32 = 6;

/// Zoom value for an integer zoom step, rounded to [`ZOOM_DECIMALS`].
///
/// Negative steps zoom out, positive steps zoom in.
pub fn zoom_for_step(factor: f64, step: i32) -> f64 {
    let quantum = 10f64.powi(ZOOM_DECIMALS as i32);
    (factor.powi(step) * quantum).round() / quantum
}
