//! Drawing primitives and the document model seam.
//!
//! The document parser and entity model are external collaborators; the tile
//! pipeline consumes primitives through the [`Primitive`] capability trait
//! only: a bounding rectangle for indexing and a render-into-surface
//! operation for rasterization. Dispatch over the concrete primitive
//! taxonomy is resolved once when a primitive is constructed, not per call.
//!
//! Primitives are shared by reference ([`PrimitiveRef`]) across every index
//! and tile structure that mentions them - never copied, never exclusively
//! owned by one node.

mod layer;
mod shapes;

use std::sync::Arc;

use image::Rgba;

use crate::geom::DrawRect;
use crate::raster::RasterSurface;

pub use layer::{Drawing, Layer};
pub use shapes::{EllipseShape, LineSegment, RectShape};

/// Stroke/brush parameters for rendering a primitive.
///
/// A process-wide keyed cache of derived brush resources is the host
/// application's concern; primitives only carry the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    /// RGBA color.
    pub color: Rgba<u8>,
    /// Stroke width in drawing units.
    pub stroke_width: f64,
}

impl Paint {
    pub fn new(color: Rgba<u8>, stroke_width: f64) -> Self {
        Self {
            color,
            stroke_width,
        }
    }

    /// Opaque black hairline.
    pub fn hairline() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            stroke_width: 1.0,
        }
    }
}

/// Capability interface every drawable primitive exposes.
pub trait Primitive: Send + Sync {
    /// Axis-aligned bounding rectangle in drawing space.
    ///
    /// Primitives with degenerate bounds are dropped at indexing time.
    fn bounds(&self) -> DrawRect;

    /// Rasterize into the surface through its drawing-to-pixel transform.
    ///
    /// Pixels falling outside the surface are clipped by the surface
    /// itself; geometry is never pre-clipped to cell boundaries.
    fn render_into(&self, surface: &mut RasterSurface);
}

/// Shared primitive handle.
pub type PrimitiveRef = Arc<dyn Primitive>;

/// Stable identity of a shared primitive, for deduplication.
///
/// Two `PrimitiveRef`s clone-share the same identity; distinct allocations
/// never collide.
pub(crate) fn primitive_id(p: &PrimitiveRef) -> usize {
    Arc::as_ptr(p) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_hairline() {
        let paint = Paint::hairline();
        assert_eq!(paint.color, Rgba([0, 0, 0, 255]));
        assert_eq!(paint.stroke_width, 1.0);
    }

    #[test]
    fn test_primitive_id_shared_vs_distinct() {
        let a: PrimitiveRef = Arc::new(RectShape::filled(
            DrawRect::new(0.0, 0.0, 1.0, 1.0),
            Paint::hairline(),
        ));
        let b = a.clone();
        let c: PrimitiveRef = Arc::new(RectShape::filled(
            DrawRect::new(0.0, 0.0, 1.0, 1.0),
            Paint::hairline(),
        ));

        assert_eq!(primitive_id(&a), primitive_id(&b));
        assert_ne!(primitive_id(&a), primitive_id(&c));
    }
}
