//! Software-rendered primitive shapes.
//!
//! These cover the geometry kinds the tile pipeline is exercised with:
//! stroked line segments, filled/outlined rectangles and filled ellipses.
//! Rendering is plain pixel placement against the surface transform; the
//! surface clips, so shapes can straddle cell boundaries freely.

use image::Rgba;

use super::{Paint, Primitive};
use crate::geom::{DrawPoint, DrawRect};
use crate::raster::RasterSurface;

/// A stroked line segment.
#[derive(Debug, Clone)]
pub struct LineSegment {
    from: DrawPoint,
    to: DrawPoint,
    paint: Paint,
}

impl LineSegment {
    pub fn new(from: DrawPoint, to: DrawPoint, paint: Paint) -> Self {
        Self { from, to, paint }
    }
}

impl Primitive for LineSegment {
    fn bounds(&self) -> DrawRect {
        // The stroke has thickness, so even an axis-aligned segment owns a
        // non-degenerate rectangle.
        let half = (self.paint.stroke_width / 2.0).max(f64::EPSILON);
        DrawRect {
            min_x: self.from.x.min(self.to.x) - half,
            min_y: self.from.y.min(self.to.y) - half,
            max_x: self.from.x.max(self.to.x) + half,
            max_y: self.from.y.max(self.to.y) + half,
        }
    }

    fn render_into(&self, surface: &mut RasterSurface) {
        let (x0, y0) = surface.to_pixel(self.from);
        let (x1, y1) = surface.to_pixel(self.to);
        let t = *surface.transform();
        let stroke_px = (self.paint.stroke_width * (t.scale_x + t.scale_y) / 2.0).max(1.0);
        let half = stroke_px / 2.0;

        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil() as u64 + 1;
        for i in 0..=steps {
            let f = i as f64 / steps as f64;
            let cx = x0 + (x1 - x0) * f;
            let cy = y0 + (y1 - y0) * f;
            surface.fill_span(
                (cx - half).floor() as i64,
                (cy - half).floor() as i64,
                (cx + half).ceil() as i64,
                (cy + half).ceil() as i64,
                self.paint.color,
            );
        }
    }
}

/// A filled or outlined axis-aligned rectangle.
#[derive(Debug, Clone)]
pub struct RectShape {
    rect: DrawRect,
    paint: Paint,
    filled: bool,
}

impl RectShape {
    pub fn filled(rect: DrawRect, paint: Paint) -> Self {
        Self {
            rect,
            paint,
            filled: true,
        }
    }

    pub fn outline(rect: DrawRect, paint: Paint) -> Self {
        Self {
            rect,
            paint,
            filled: false,
        }
    }
}

impl Primitive for RectShape {
    fn bounds(&self) -> DrawRect {
        self.rect
    }

    fn render_into(&self, surface: &mut RasterSurface) {
        let (x0, y0) = surface.to_pixel(DrawPoint::new(self.rect.min_x, self.rect.min_y));
        let (x1, y1) = surface.to_pixel(DrawPoint::new(self.rect.max_x, self.rect.max_y));
        let (x0, y0) = (x0.floor() as i64, y0.floor() as i64);
        let (x1, y1) = (x1.ceil() as i64, y1.ceil() as i64);

        if self.filled {
            surface.fill_span(x0, y0, x1, y1, self.paint.color);
        } else {
            let t = *surface.transform();
            let w = ((self.paint.stroke_width * (t.scale_x + t.scale_y) / 2.0).ceil() as i64)
                .max(1);
            surface.fill_span(x0, y0, x1, y0 + w, self.paint.color);
            surface.fill_span(x0, y1 - w, x1, y1, self.paint.color);
            surface.fill_span(x0, y0, x0 + w, y1, self.paint.color);
            surface.fill_span(x1 - w, y0, x1, y1, self.paint.color);
        }
    }
}

/// A filled axis-aligned ellipse.
#[derive(Debug, Clone)]
pub struct EllipseShape {
    center: DrawPoint,
    radius_x: f64,
    radius_y: f64,
    paint: Paint,
}

impl EllipseShape {
    pub fn new(center: DrawPoint, radius_x: f64, radius_y: f64, paint: Paint) -> Self {
        Self {
            center,
            radius_x,
            radius_y,
            paint,
        }
    }
}

impl Primitive for EllipseShape {
    fn bounds(&self) -> DrawRect {
        DrawRect {
            min_x: self.center.x - self.radius_x,
            min_y: self.center.y - self.radius_y,
            max_x: self.center.x + self.radius_x,
            max_y: self.center.y + self.radius_y,
        }
    }

    fn render_into(&self, surface: &mut RasterSurface) {
        let (cx, cy) = surface.to_pixel(self.center);
        let t = *surface.transform();
        let rx = (self.radius_x * t.scale_x).max(0.5);
        let ry = (self.radius_y * t.scale_y).max(0.5);

        let y_lo = (cy - ry).floor() as i64;
        let y_hi = (cy + ry).ceil() as i64;
        for py in y_lo..=y_hi {
            let dy = (py as f64 + 0.5 - cy) / ry;
            let rest = 1.0 - dy * dy;
            if rest < 0.0 {
                continue;
            }
            let dx = rest.sqrt() * rx;
            surface.fill_span(
                (cx - dx).floor() as i64,
                py,
                (cx + dx).ceil() as i64,
                py + 1,
                self.paint.color,
            );
        }
    }
}
