//! Error types for pyramid builds.

use thiserror::Error;

use crate::raster::ScratchError;

/// Errors that can occur while building a tile pyramid.
///
/// A build error is atomic: the failed pyramid is never published and its
/// scratch directory is removed by the caller.
#[derive(Debug, Error)]
pub enum TileError {
    /// Scratch staging failed (contention budget spent, or a truncated
    /// tile on reload).
    #[error("scratch staging failed: {0}")]
    Scratch(#[from] ScratchError),

    /// A root raster came out larger than the hardware texture limit.
    ///
    /// The root split is derived from that limit, so this only fires on
    /// inconsistent parameters.
    #[error("root raster {width}x{height} exceeds the {max_dim} px texture limit")]
    OversizedRoot {
        width: u32,
        height: u32,
        max_dim: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_oversized_root_display() {
        let err = TileError::OversizedRoot {
            width: 9000,
            height: 4000,
            max_dim: 8192,
        };
        let msg = err.to_string();
        assert!(msg.contains("9000x4000"));
        assert!(msg.contains("8192"));
    }

    #[test]
    fn test_scratch_error_converts() {
        let scratch = ScratchError::TruncatedTile {
            path: PathBuf::from("zs0/r0_0_t0_0.raw"),
            expected: 64,
            actual: 10,
        };
        let err: TileError = scratch.into();
        assert!(matches!(err, TileError::Scratch(_)));
    }
}
