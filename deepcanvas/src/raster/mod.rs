//! Raster surfaces and disk-backed scratch storage.
//!
//! [`RasterSurface`] is the canvas primitives render into; one surface backs
//! each root raster of a pyramid. [`ScratchStore`] owns the on-disk staging
//! area leaf tiles are persisted to: one directory per zoom step, one raw
//! RGBA8 file per leaf, wiped whenever the step is rebuilt or evicted.
//! Nothing in the scratch area persists across process runs.

mod scratch;
mod surface;

pub use scratch::{RetryPolicy, ScratchError, ScratchStore};
pub use surface::RasterSurface;
