//! Tile tree and zoom-level pyramid.
//!
//! A [`TilePyramid`] pre-renders the drawing at one zoom step: it splits the
//! overall pixel extent into a grid of root rasters that each fit under the
//! hardware texture limit, rasterizes the primitives of each root cell
//! once, and hands every root raster to a [`TileNode`] that recursively
//! quarters it down to bounded-size [`LeafTile`]s.
//!
//! Leaves are staged through scratch files: each leaf crops its slice out
//! of the shared root raster, persists the staging copy, releases it, and
//! reloads the persisted bytes into the drawable bitmap it keeps. The
//! staging and drawable copies never coexist, which bounds peak raster
//! memory during a build; the scratch file also lets a leaf be unloaded and
//! reloaded independently later.

mod error;
mod node;
mod pyramid;

pub use error::TileError;
pub use node::{LeafTile, TileNode};
pub use pyramid::{
    required_depth, required_root_split, PyramidParams, TilePyramid, DEFAULT_LEAF_TILE_PX,
};
