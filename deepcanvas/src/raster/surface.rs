//! Render target for primitive rasterization.

use crate::geom::{DrawPoint, Transform};
use image::{Rgba, RgbaImage};

/// A blank RGBA canvas plus the mapping from drawing space into it.
///
/// Primitives render themselves through the surface's transform; pixels
/// outside the canvas are silently discarded, so a primitive straddling a
/// cell boundary can be handed to every cell it touches and each cell keeps
/// only its own slice of the rendering.
pub struct RasterSurface {
    image: RgbaImage,
    transform: Transform,
}

impl RasterSurface {
    /// Create a fully transparent surface of the given pixel size.
    pub fn new(width: u32, height: u32, transform: Transform) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            transform,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The drawing-space to surface-pixel mapping.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Map a drawing-space point to surface pixel coordinates.
    pub fn to_pixel(&self, p: DrawPoint) -> (f64, f64) {
        self.transform.apply(p)
    }

    /// Set one pixel, ignoring coordinates outside the canvas.
    pub fn set_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Fill the half-open pixel span `[x0, x1) x [y0, y1)`, clipped to the
    /// canvas.
    pub fn fill_span(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let cx0 = x0.max(0);
        let cy0 = y0.max(0);
        let cx1 = x1.min(self.image.width() as i64);
        let cy1 = y1.min(self.image.height() as i64);
        for py in cy0..cy1 {
            for px in cx0..cx1 {
                self.image.put_pixel(px as u32, py as u32, color);
            }
        }
    }

    /// Consume the surface and take its backing image.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}
