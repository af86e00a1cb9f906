//! Core types for the zoom-step cache.

use std::path::PathBuf;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::host::HostError;
use crate::raster::{RetryPolicy, ScratchError};
use crate::tile::TileError;

/// Cache-level errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The render host could not report a required capability.
    #[error("render host capability: {0}")]
    Host(#[from] HostError),

    /// A pyramid build failed; the cache map was not touched.
    #[error("pyramid build failed for zoom step {step}: {source}")]
    Build { step: i32, source: TileError },

    /// Scratch storage failed outside a build (store creation, eviction).
    #[error("scratch storage: {0}")]
    Scratch(#[from] ScratchError),

    /// Invalid cache configuration.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The background refresh task panicked or was aborted.
    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}

/// Result of a [`set_current_zoom_step`] request.
///
/// [`set_current_zoom_step`]: crate::cache::TileCache::set_current_zoom_step
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A refresh was spawned. Awaiting the handle reports the build result;
    /// the render thread is free to keep querying meanwhile.
    Started(JoinHandle<Result<(), CacheError>>),

    /// The requested step is the one currently being built; the request is
    /// a no-op.
    AlreadyBuilding,

    /// A refresh for a different step is in flight. The request is dropped,
    /// not queued - re-issue it once the in-flight refresh completes.
    Dropped { in_flight: i32 },

    /// The cache has been shut down; no further refreshes run.
    ShutDown,
}

/// Configuration for the tile cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Base of the zoom sequence: zoom = factor^step.
    pub zoom_factor: f64,
    /// Resident steps kept below the current one.
    pub window_below: u32,
    /// Resident steps kept above the current one.
    pub window_above: u32,
    /// Target leaf tile edge length in pixels.
    pub leaf_tile_px: u32,
    /// Device pixel ratio applied on top of the zoom.
    pub device_scale: f64,
    /// Scratch directory root for persisted leaf tiles.
    pub scratch_dir: PathBuf,
    /// Retry budget for scratch filesystem operations.
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let scratch_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deepcanvas")
            .join("tiles");

        Self {
            zoom_factor: 1.3,
            window_below: 2,
            window_above: 2,
            leaf_tile_px: crate::tile::DEFAULT_LEAF_TILE_PX,
            device_scale: 1.0,
            scratch_dir,
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the default zoom sequence and window.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom_factor(mut self, zoom_factor: f64) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }

    /// Retention window around the current step, in zoom steps.
    pub fn with_window(mut self, below: u32, above: u32) -> Self {
        self.window_below = below;
        self.window_above = above;
        self
    }

    pub fn with_leaf_tile_px(mut self, leaf_tile_px: u32) -> Self {
        self.leaf_tile_px = leaf_tile_px;
        self
    }

    pub fn with_device_scale(mut self, device_scale: f64) -> Self {
        self.device_scale = device_scale;
        self
    }

    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CacheError> {
        if !(self.zoom_factor.is_finite() && self.zoom_factor > 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "zoom factor must be finite and > 1.0, got {}",
                self.zoom_factor
            )));
        }
        if self.leaf_tile_px == 0 {
            return Err(CacheError::InvalidConfig(
                "leaf tile size must be at least 1 px".to_string(),
            ));
        }
        if !(self.device_scale.is_finite() && self.device_scale > 0.0) {
            return Err(CacheError::InvalidConfig(format!(
                "device scale must be finite and positive, got {}",
                self.device_scale
            )));
        }
        Ok(())
    }
}
