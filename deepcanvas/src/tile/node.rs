//! Recursive subdivision of one root raster into leaf tiles.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use image::imageops;
use image::RgbaImage;
use tracing::warn;

use super::TileError;
use crate::geom::{DrawPoint, DrawRect, PixelRect, Transform};
use crate::primitive::PrimitiveRef;
use crate::raster::ScratchStore;

/// The smallest cached raster unit.
///
/// A leaf owns an independently persisted scratch file and, while loaded, a
/// drawable bitmap reconstructed from it. Handles are shared (`Arc`), so a
/// consumer can keep compositing a frame's tiles while the cache disposes
/// the pyramid they came from; the bitmap `Arc` it cloned stays valid even
/// after the leaf itself is unloaded.
pub struct LeafTile {
    bounds: DrawRect,
    dest_rect: PixelRect,
    transform: Transform,
    path: PathBuf,
    primitives: Vec<PrimitiveRef>,
    bitmap: RwLock<Option<Arc<RgbaImage>>>,
}

impl LeafTile {
    /// Drawing-space bounds of this tile.
    pub fn bounds(&self) -> &DrawRect {
        &self.bounds
    }

    /// Destination rectangle in the pyramid's overall pixel space.
    pub fn dest_rect(&self) -> &PixelRect {
        &self.dest_rect
    }

    /// Drawing-space to tile-local pixel mapping.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Scratch file backing this tile.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Primitives whose bounds intersect this tile, for hit-testing and
    /// snapping.
    pub fn primitives(&self) -> &[PrimitiveRef] {
        &self.primitives
    }

    /// The drawable bitmap, if currently loaded.
    pub fn bitmap(&self) -> Option<Arc<RgbaImage>> {
        self.bitmap.read().expect("leaf bitmap lock poisoned").clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.bitmap
            .read()
            .expect("leaf bitmap lock poisoned")
            .is_some()
    }

    /// Drop the resident bitmap; the persisted bytes stay on disk.
    pub fn unload(&self) {
        *self.bitmap.write().expect("leaf bitmap lock poisoned") = None;
    }

    /// Reload the drawable bitmap from the persisted scratch file.
    ///
    /// Returns the already-resident bitmap when one is loaded.
    pub fn reload(&self, scratch: &ScratchStore) -> Result<Arc<RgbaImage>, TileError> {
        if let Some(bitmap) = self.bitmap() {
            return Ok(bitmap);
        }
        let image = scratch.load(&self.path, self.dest_rect.width, self.dest_rect.height)?;
        let bitmap = Arc::new(image);
        *self.bitmap.write().expect("leaf bitmap lock poisoned") = Some(bitmap.clone());
        Ok(bitmap)
    }

    /// Persist-if-needed, then release the drawable bitmap.
    ///
    /// The persist check runs before the release so unpersisted raster data
    /// cannot be lost on eviction; a failed persist keeps the bitmap
    /// resident and is reported, not swallowed silently.
    fn dispose(&self, scratch: &ScratchStore) {
        let mut guard = self.bitmap.write().expect("leaf bitmap lock poisoned");
        if let Some(bitmap) = guard.as_ref() {
            if !self.path.exists() {
                if let Err(e) = scratch.persist(&self.path, bitmap) {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "could not persist leaf tile during dispose; keeping it resident"
                    );
                    return;
                }
            }
        }
        *guard = None;
    }
}

/// Build-time frame shared by every node under one root raster.
///
/// Child rects at any level are computed from these top-level rects and the
/// node's global grid coordinates - never by halving an already-halved
/// value - so sibling tiles carry no cumulative rounding drift.
pub(crate) struct RootFrame {
    /// Drawing-space bounds of the root cell.
    pub bounds: DrawRect,
    /// Destination rect of the root cell in overall pyramid pixel space.
    pub dest_rect: PixelRect,
    /// Source rect covering the whole root raster.
    pub source_rect: PixelRect,
    /// Drawing-space to root-raster pixel mapping.
    pub transform: Transform,
    /// Tree depth: leaves sit `depth` levels below the root.
    pub depth: u32,
    /// Root cell position in the pyramid's root grid, for scratch naming.
    pub grid_col: u32,
    pub grid_row: u32,
}

/// One node of a root raster's tile tree.
///
/// Exactly one of two shapes: an internal node (level > 0) holding four
/// children that partition it, or a leaf (level 0) holding a [`LeafTile`].
pub struct TileNode {
    level: u32,
    bounds: DrawRect,
    dest_rect: PixelRect,
    source_rect: PixelRect,
    children: Option<Box<[TileNode; 4]>>,
    leaf: Option<Arc<LeafTile>>,
}

impl TileNode {
    /// Build the subtree for grid cell `(gx, gy)` at `level`.
    ///
    /// `primitives` is the broad-phase subset for this cell; each child
    /// re-filters it against the child's quadrant bounds, the same
    /// duplication policy the spatial index uses.
    pub(crate) fn build(
        frame: &RootFrame,
        raster: &RgbaImage,
        scratch: &ScratchStore,
        step: i32,
        level: u32,
        gx: u32,
        gy: u32,
        primitives: Vec<PrimitiveRef>,
    ) -> Result<TileNode, TileError> {
        let divisions = 1u32 << (frame.depth - level);
        let bounds = frame.bounds.grid_cell(gx, gy, divisions);
        let dest_rect = frame.dest_rect.grid_cell(gx, gy, divisions);
        let source_rect = frame.source_rect.grid_cell(gx, gy, divisions);

        if level > 0 {
            let mut children = Vec::with_capacity(4);
            for (dx, dy) in [(0u32, 0u32), (1, 0), (0, 1), (1, 1)] {
                let (cgx, cgy) = (gx * 2 + dx, gy * 2 + dy);
                let child_bounds = frame
                    .bounds
                    .grid_cell(cgx, cgy, 1u32 << (frame.depth - level + 1));
                let subset: Vec<PrimitiveRef> = primitives
                    .iter()
                    .filter(|p| p.bounds().intersects(&child_bounds))
                    .cloned()
                    .collect();
                children.push(Self::build(
                    frame, raster, scratch, step, level - 1, cgx, cgy, subset,
                )?);
            }
            let children: Box<[TileNode; 4]> = children
                .try_into()
                .unwrap_or_else(|_| unreachable!("exactly four quadrants built"));
            return Ok(TileNode {
                level,
                bounds,
                dest_rect,
                source_rect,
                children: Some(children),
                leaf: None,
            });
        }

        // Leaf: crop the staging copy out of the shared root raster,
        // persist it, release it, then reload the persisted bytes as the
        // drawable bitmap. Staging and drawable copies never coexist.
        let staging: RgbaImage = imageops::crop_imm(
            raster,
            source_rect.x,
            source_rect.y,
            source_rect.width,
            source_rect.height,
        )
        .to_image();
        let path = scratch.tile_path(step, frame.grid_col, frame.grid_row, gx, gy);
        scratch.persist(&path, &staging)?;
        drop(staging);
        let drawable = scratch.load(&path, source_rect.width, source_rect.height)?;

        let transform = frame
            .transform
            .shifted(source_rect.x as f64, source_rect.y as f64);
        let leaf = Arc::new(LeafTile {
            bounds,
            dest_rect,
            transform,
            path,
            primitives,
            bitmap: RwLock::new(Some(Arc::new(drawable))),
        });
        Ok(TileNode {
            level: 0,
            bounds,
            dest_rect,
            source_rect,
            children: None,
            leaf: Some(leaf),
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn bounds(&self) -> &DrawRect {
        &self.bounds
    }

    pub fn dest_rect(&self) -> &PixelRect {
        &self.dest_rect
    }

    pub fn source_rect(&self) -> &PixelRect {
        &self.source_rect
    }

    pub fn children(&self) -> Option<&[TileNode; 4]> {
        self.children.as_deref()
    }

    pub fn leaf(&self) -> Option<&Arc<LeafTile>> {
        self.leaf.as_ref()
    }

    /// Collect leaf tiles whose destination rect intersects `view`.
    ///
    /// Subtrees whose destination rect misses `view` are pruned without
    /// descent.
    pub fn intersecting(&self, view: &PixelRect, out: &mut Vec<Arc<LeafTile>>) {
        if !self.dest_rect.intersects(view) {
            return;
        }
        match &self.children {
            Some(children) => {
                for child in children.iter() {
                    child.intersecting(view, out);
                }
            }
            None => {
                if let Some(leaf) = &self.leaf {
                    out.push(leaf.clone());
                }
            }
        }
    }

    /// The unique leaf whose drawing-space bounds contain `point`.
    pub fn at_point(&self, point: DrawPoint) -> Option<Arc<LeafTile>> {
        if !self.bounds.contains(point) {
            return None;
        }
        match &self.children {
            Some(children) => children.iter().find_map(|c| c.at_point(point)),
            None => self.leaf.clone(),
        }
    }

    /// Release the subtree's raster memory.
    ///
    /// Order matters: each leaf is persisted (if needed) and released
    /// before its siblings' subtrees are descended, so no unpersisted
    /// raster data is lost partway through an eviction.
    pub fn dispose(&self, scratch: &ScratchStore) {
        if let Some(leaf) = &self.leaf {
            leaf.dispose(scratch);
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.dispose(scratch);
            }
        }
    }
}
