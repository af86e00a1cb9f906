//! Disk staging area for leaf tiles.
//!
//! Layout: `<root>/zs<step>/r<col>_<row>_t<gx>_<gy>.raw`, one directory per
//! zoom step, one file per leaf tile. Files hold fixed-format raw RGBA8
//! bytes with no header; the leaf carries its own dimensions and a length
//! check guards against truncation on reload.
//!
//! Scratch paths can be hit by transient external locks (indexers, virus
//! scanners, the previous eviction still letting go of a handle). Every
//! filesystem touch therefore runs under a bounded wait-and-retry and fails
//! with [`ScratchError::Contention`] once the budget is spent - never an
//! indefinite block.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

/// Bounded retry budget for scratch filesystem operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub attempts: u32,
    /// Sleep between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(25),
        }
    }
}

/// Errors raised by the scratch store.
#[derive(Debug, Error)]
pub enum ScratchError {
    /// A path stayed inaccessible through the whole retry budget.
    #[error("scratch path {path:?} still inaccessible after {attempts} attempts: {source}")]
    Contention {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },

    /// A reloaded tile file did not hold the expected number of bytes.
    #[error("truncated tile {path:?}: expected {expected} bytes, found {actual}")]
    TruncatedTile {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Owner of the scratch directory tree.
///
/// Creating a store wipes whatever a previous process run left behind;
/// scratch state never outlives the process that wrote it.
pub struct ScratchStore {
    root: PathBuf,
    retry: RetryPolicy,
    tiles_persisted: AtomicU64,
    bytes_persisted: AtomicU64,
    tiles_reloaded: AtomicU64,
}

impl ScratchStore {
    /// Create the store, clearing and recreating the root directory.
    pub fn create(root: PathBuf, retry: RetryPolicy) -> Result<Self, ScratchError> {
        remove_dir_all_retry(&root, &retry)?;
        with_retry(&root, &retry, || fs::create_dir_all(&root))?;
        debug!(root = %root.display(), "scratch store ready");
        Ok(Self {
            root,
            retry,
            tiles_persisted: AtomicU64::new(0),
            bytes_persisted: AtomicU64::new(0),
            tiles_reloaded: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one zoom step's leaf tiles.
    pub fn step_dir(&self, step: i32) -> PathBuf {
        self.root.join(format!("zs{}", step))
    }

    /// Wipe and recreate a step directory ahead of a pyramid build.
    ///
    /// A rebuild must never observe files left over from a prior build of
    /// the same step against a different primitive set.
    pub fn reset_step(&self, step: i32) -> Result<PathBuf, ScratchError> {
        let dir = self.step_dir(step);
        remove_dir_all_retry(&dir, &self.retry)?;
        with_retry(&dir, &self.retry, || fs::create_dir_all(&dir))?;
        Ok(dir)
    }

    /// Delete a step directory and everything in it.
    pub fn remove_step(&self, step: i32) -> Result<(), ScratchError> {
        let dir = self.step_dir(step);
        remove_dir_all_retry(&dir, &self.retry)
    }

    /// Whether a step directory currently exists on disk.
    pub fn step_exists(&self, step: i32) -> bool {
        self.step_dir(step).is_dir()
    }

    /// Unique path for one leaf tile.
    ///
    /// `(root_col, root_row)` address the root raster in the pyramid's root
    /// grid; `(gx, gy)` address the leaf in the root's level-0 grid.
    pub fn tile_path(&self, step: i32, root_col: u32, root_row: u32, gx: u32, gy: u32) -> PathBuf {
        self.step_dir(step)
            .join(format!("r{}_{}_t{}_{}.raw", root_col, root_row, gx, gy))
    }

    /// Persist a staging bitmap as raw RGBA8 bytes.
    pub fn persist(&self, path: &Path, staging: &RgbaImage) -> Result<(), ScratchError> {
        let bytes = staging.as_raw();
        with_retry(path, &self.retry, || fs::write(path, bytes))?;
        self.tiles_persisted.fetch_add(1, Ordering::Relaxed);
        self.bytes_persisted
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Reload persisted bytes into a drawable bitmap of known dimensions.
    pub fn load(&self, path: &Path, width: u32, height: u32) -> Result<RgbaImage, ScratchError> {
        let bytes = with_retry(path, &self.retry, || fs::read(path))?;
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(ScratchError::TruncatedTile {
                path: path.to_path_buf(),
                expected,
                actual: bytes.len(),
            });
        }
        // Length was checked above, so from_raw cannot fail.
        let image = RgbaImage::from_raw(width, height, bytes).ok_or_else(|| {
            ScratchError::TruncatedTile {
                path: path.to_path_buf(),
                expected,
                actual: 0,
            }
        })?;
        self.tiles_reloaded.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    /// Tiles persisted since the store was created.
    pub fn tiles_persisted(&self) -> u64 {
        self.tiles_persisted.load(Ordering::Relaxed)
    }

    /// Raw bytes written since the store was created.
    pub fn bytes_persisted(&self) -> u64 {
        self.bytes_persisted.load(Ordering::Relaxed)
    }

    /// Tiles reloaded from disk since the store was created.
    pub fn tiles_reloaded(&self) -> u64 {
        self.tiles_reloaded.load(Ordering::Relaxed)
    }
}

/// Run `op` under the retry budget, sleeping between attempts.
fn with_retry<T>(
    path: &Path,
    policy: &RetryPolicy,
    mut op: impl FnMut() -> io::Result<T>,
) -> Result<T, ScratchError> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "scratch I/O failed, retrying"
                );
                last_err = Some(e);
                if attempt < attempts {
                    thread::sleep(policy.delay);
                }
            }
        }
    }
    Err(ScratchError::Contention {
        path: path.to_path_buf(),
        attempts,
        source: last_err.unwrap_or_else(|| io::Error::other("no attempt ran")),
    })
}

/// `remove_dir_all` that treats a missing directory as success.
fn remove_dir_all_retry(dir: &Path, policy: &RetryPolicy) -> Result<(), ScratchError> {
    with_retry(dir, policy, || match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    })
}
