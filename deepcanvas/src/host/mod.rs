//! Render-surface host capabilities.
//!
//! The windowing/GPU host is an external collaborator; the tile pipeline
//! only consumes two facts from it: the maximum single-texture pixel
//! dimension the device can allocate, and the current device pixel size.
//! [`RenderHost`] is the seam, [`StaticHost`] a fixed-capability
//! implementation for tests and headless use.

use thiserror::Error;

/// Errors reported by a render host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The hardware cannot report a maximum texture dimension.
    ///
    /// Fatal at startup: without the limit the root split of every pyramid
    /// is unbounded, so the cache refuses to construct.
    #[error("render host cannot report a maximum texture dimension")]
    CapabilityUnavailable,
}

/// Capabilities the tile pipeline consumes from the render-surface host.
pub trait RenderHost: Send + Sync {
    /// Maximum single-texture pixel dimension the device supports
    /// (e.g. 8192 or 16384).
    fn max_texture_dim(&self) -> Result<u32, HostError>;

    /// Current device pixel size of the render surface, `(width, height)`.
    fn device_pixel_size(&self) -> (u32, u32);
}

/// A host with fixed, pre-known capabilities.
#[derive(Debug, Clone)]
pub struct StaticHost {
    max_texture_dim: Option<u32>,
    device_pixel_size: (u32, u32),
}

impl StaticHost {
    /// A host reporting the given texture limit and surface size.
    pub fn new(max_texture_dim: u32, device_pixel_size: (u32, u32)) -> Self {
        Self {
            max_texture_dim: Some(max_texture_dim),
            device_pixel_size,
        }
    }

    /// A host unable to report a texture limit.
    ///
    /// Constructing a cache against it must fail; used to exercise the
    /// fatal startup path.
    pub fn without_texture_limit(device_pixel_size: (u32, u32)) -> Self {
        Self {
            max_texture_dim: None,
            device_pixel_size,
        }
    }
}

impl RenderHost for StaticHost {
    fn max_texture_dim(&self) -> Result<u32, HostError> {
        self.max_texture_dim.ok_or(HostError::CapabilityUnavailable)
    }

    fn device_pixel_size(&self) -> (u32, u32) {
        self.device_pixel_size
    }
}
