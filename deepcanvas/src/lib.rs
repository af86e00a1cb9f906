//! DeepCanvas - tiled deep-zoom cache for large vector drawings.
//!
//! This library lets a viewer pan and zoom smoothly over drawings containing
//! many thousands of geometric primitives, on hardware that cannot rasterize
//! the whole drawing into a single texture at high zoom. It combines a
//! quad-tree spatial index over the drawing with a zoom-indexed pyramid of
//! bounded-size raster tiles, staged through scratch files on disk so that
//! only a sliding window of zoom levels stays resident in memory.
//!
//! # High-Level API
//!
//! ```ignore
//! use deepcanvas::cache::{CacheConfig, RefreshOutcome, TileCache};
//! use deepcanvas::host::StaticHost;
//! use deepcanvas::spatial::SpatialIndex;
//! use std::sync::Arc;
//!
//! let index = Arc::new(SpatialIndex::build(&primitives, extents, 4));
//! let host = StaticHost::new(8192, (1920, 1080));
//! let cache = TileCache::new(index, &host, CacheConfig::default())?;
//!
//! // Build tiles for the current zoom level in the background.
//! if let RefreshOutcome::Started(handle) = cache.set_current_zoom_step(0) {
//!     handle.await??;
//! }
//!
//! // Per-frame: composite the leaf tiles intersecting the viewport.
//! let tiles = cache.intersecting(0, &viewport);
//! ```

pub mod cache;
pub mod geom;
pub mod host;
pub mod logging;
pub mod primitive;
pub mod raster;
pub mod spatial;
pub mod tile;

/// Version of the DeepCanvas library.
///
/// Synchronized across the workspace; injected at compile time from
/// `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
