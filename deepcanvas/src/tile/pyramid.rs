//! Per-zoom-step pyramid of root rasters and their tile trees.

use std::sync::Arc;

use tracing::{debug, info};

use super::node::RootFrame;
use super::{LeafTile, TileError, TileNode};
use crate::geom::{zoom_for_step, DrawPoint, PixelRect, Transform};
use crate::raster::{RasterSurface, ScratchStore};
use crate::spatial::SpatialIndex;

/// Default edge length a leaf tile is subdivided down to.
pub const DEFAULT_LEAF_TILE_PX: u32 = 512;

/// Parameters a pyramid build derives its layout from.
#[derive(Debug, Clone, Copy)]
pub struct PyramidParams {
    /// Base of the zoom sequence: zoom = factor^step.
    pub zoom_factor: f64,
    /// Hardware maximum single-texture dimension, reported by the host.
    pub max_texture_dim: u32,
    /// Target leaf tile edge length in pixels.
    pub leaf_tile_px: u32,
    /// Device pixel ratio applied on top of the zoom.
    pub device_scale: f64,
}

impl PyramidParams {
    pub fn new(zoom_factor: f64, max_texture_dim: u32) -> Self {
        Self {
            zoom_factor,
            max_texture_dim,
            leaf_tile_px: DEFAULT_LEAF_TILE_PX,
            device_scale: 1.0,
        }
    }

    pub fn with_leaf_tile_px(mut self, leaf_tile_px: u32) -> Self {
        self.leaf_tile_px = leaf_tile_px;
        self
    }

    pub fn with_device_scale(mut self, device_scale: f64) -> Self {
        self.device_scale = device_scale;
        self
    }
}

/// Per-axis root count for an overall pixel extent.
///
/// `ceil(overall / max_dim)`, rounded up to the next power of two so the
/// recursive quartering below stays exact. The root grid is square, derived
/// from the larger axis.
pub fn required_root_split(overall_px: u32, max_texture_dim: u32) -> u32 {
    let per_axis = overall_px.div_ceil(max_texture_dim).max(1);
    per_axis.next_power_of_two()
}

/// Smallest depth at which ceil-halving `root_px` reaches the leaf target.
pub fn required_depth(root_px: u32, leaf_target_px: u32) -> u32 {
    let mut depth = 0;
    let mut dim = root_px;
    while dim > leaf_target_px {
        dim = dim.div_ceil(2);
        depth += 1;
    }
    depth
}

/// All tiles for one zoom step.
///
/// Owns a grid of root [`TileNode`] trees. During the build each root
/// raster acts as an arena: every descendant leaf extracts an independent
/// persisted copy from it, after which the shared raster is released. Once
/// built, a pyramid is immutable until it is disposed.
pub struct TilePyramid {
    zoom_step: i32,
    zoom: f64,
    overall_px: (u32, u32),
    dest_rect: PixelRect,
    depth: u32,
    root_split: u32,
    roots: Vec<TileNode>,
}

impl TilePyramid {
    /// Build the pyramid for `step`.
    ///
    /// Queries the spatial index per root cell, rasterizes each cell once,
    /// and subdivides the raster down to leaf tiles staged through
    /// `scratch`. Degenerate drawing extents are not an error: they produce
    /// a valid 1x1 pyramid of blank tiles.
    pub fn build(
        index: &SpatialIndex,
        params: &PyramidParams,
        step: i32,
        scratch: &ScratchStore,
    ) -> Result<TilePyramid, TileError> {
        let zoom = zoom_for_step(params.zoom_factor, step);
        let extents = index.bounds();
        let px_scale = zoom * params.device_scale;
        let overall_w = ((extents.width() * px_scale).ceil() as u32).max(1);
        let overall_h = ((extents.height() * px_scale).ceil() as u32).max(1);

        let root_split = required_root_split(overall_w.max(overall_h), params.max_texture_dim);
        let cell_w = overall_w.div_ceil(root_split);
        let cell_h = overall_h.div_ceil(root_split);
        if cell_w > params.max_texture_dim || cell_h > params.max_texture_dim {
            return Err(TileError::OversizedRoot {
                width: cell_w,
                height: cell_h,
                max_dim: params.max_texture_dim,
            });
        }
        let depth = required_depth(cell_w.max(cell_h), params.leaf_tile_px);

        let dest_rect = PixelRect::new(0, 0, overall_w, overall_h);
        let global_transform = Transform::fit(&extents, overall_w, overall_h);

        scratch.reset_step(step)?;
        debug!(
            step,
            zoom,
            overall_w,
            overall_h,
            root_split,
            depth,
            "building tile pyramid"
        );

        let mut roots = Vec::with_capacity((root_split * root_split) as usize);
        for row in 0..root_split {
            for col in 0..root_split {
                let cell_dest = dest_rect.grid_cell(col, row, root_split);
                let cell_bounds = extents.grid_cell(col, row, root_split);
                let transform =
                    global_transform.shifted(cell_dest.x as f64, cell_dest.y as f64);

                let primitives = index.query_primitives(&cell_bounds);
                let mut surface =
                    RasterSurface::new(cell_dest.width, cell_dest.height, transform);
                for primitive in &primitives {
                    primitive.render_into(&mut surface);
                }
                // This raster is the cell's arena; it drops at the end of
                // the iteration, once every leaf has extracted its copy.
                let raster = surface.into_image();

                let frame = RootFrame {
                    bounds: cell_bounds,
                    dest_rect: cell_dest,
                    source_rect: PixelRect::new(0, 0, cell_dest.width, cell_dest.height),
                    transform,
                    depth,
                    grid_col: col,
                    grid_row: row,
                };
                roots.push(TileNode::build(
                    &frame, &raster, scratch, step, depth, 0, 0, primitives,
                )?);
            }
        }

        info!(
            step,
            zoom,
            roots = roots.len(),
            leaves = roots.len() * 4usize.pow(depth),
            "tile pyramid built"
        );
        Ok(TilePyramid {
            zoom_step: step,
            zoom,
            overall_px: (overall_w, overall_h),
            dest_rect,
            depth,
            root_split,
            roots,
        })
    }

    pub fn zoom_step(&self) -> i32 {
        self.zoom_step
    }

    /// Zoom value, rounded to the fixed cache-key precision.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Overall pixel size of the drawing at this zoom step.
    pub fn overall_px(&self) -> (u32, u32) {
        self.overall_px
    }

    pub fn dest_rect(&self) -> &PixelRect {
        &self.dest_rect
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Per-axis root count.
    pub fn root_split(&self) -> u32 {
        self.root_split
    }

    pub fn roots(&self) -> &[TileNode] {
        &self.roots
    }

    /// Leaf tiles in this pyramid.
    pub fn leaf_count(&self) -> usize {
        self.roots.len() * 4usize.pow(self.depth)
    }

    /// Leaf tiles whose destination rect intersects `view`, across all
    /// roots. Order is irrelevant to compositing.
    pub fn intersecting(&self, view: &PixelRect) -> Vec<Arc<LeafTile>> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.intersecting(view, &mut out);
        }
        out
    }

    /// The leaf containing `point`, or `None` outside every root.
    pub fn at_point(&self, point: DrawPoint) -> Option<Arc<LeafTile>> {
        self.roots.iter().find_map(|r| r.at_point(point))
    }

    /// Release every tile's raster memory, persisting anything unpersisted.
    pub fn dispose(&self, scratch: &ScratchStore) {
        for root in &self.roots {
            root.dispose(scratch);
        }
    }
}
