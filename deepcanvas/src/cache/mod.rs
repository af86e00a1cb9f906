//! Sliding-window cache of tile pyramids keyed by zoom step.
//!
//! The render/interaction thread owns a [`TileCache`] and issues per-frame
//! queries against it; pyramid construction and leaf staging run on
//! background tasks so pan/zoom is never blocked. Exactly one refresh
//! (build + evictions) is in flight at a time: a request for the step
//! already being built is a no-op, a request for a different step is
//! dropped (not queued) and must be re-issued by the caller.
//!
//! A pyramid is published into the map only once its entire build has
//! completed, so a frame's queries never observe a partially constructed
//! tile tree. Eviction removes every resident step outside the retention
//! window around the current step and deletes its scratch directory.

mod stats;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::geom::{zoom_for_step, DrawPoint, PixelRect};
use crate::host::RenderHost;
use crate::raster::ScratchStore;
use crate::spatial::SpatialIndex;
use crate::tile::{LeafTile, PyramidParams, TilePyramid};

pub use stats::CacheStats;
pub use types::{CacheConfig, CacheError, RefreshOutcome};

/// Zoom-step keyed cache of tile pyramids.
///
/// Sole authority for publishing and evicting pyramids; queries never fail,
/// they return empty results for absent steps.
pub struct TileCache {
    index: Arc<SpatialIndex>,
    config: CacheConfig,
    params: PyramidParams,
    scratch: Arc<ScratchStore>,
    pyramids: Arc<DashMap<i32, Arc<TilePyramid>>>,
    busy: Arc<AtomicBool>,
    building: Arc<Mutex<Option<i32>>>,
    stats: Arc<Mutex<CacheStats>>,
    shutdown: CancellationToken,
}

impl TileCache {
    /// Create the cache for a drawing's spatial index.
    ///
    /// Probes the host once for its maximum texture dimension; a host that
    /// cannot report one is a fatal startup error. Creating the cache also
    /// clears any scratch state a previous process run left behind.
    pub fn new(
        index: Arc<SpatialIndex>,
        host: &dyn RenderHost,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let max_texture_dim = host.max_texture_dim()?;
        let scratch = Arc::new(ScratchStore::create(
            config.scratch_dir.clone(),
            config.retry,
        )?);
        let params = PyramidParams::new(config.zoom_factor, max_texture_dim)
            .with_leaf_tile_px(config.leaf_tile_px)
            .with_device_scale(config.device_scale);

        info!(
            max_texture_dim,
            zoom_factor = config.zoom_factor,
            window_below = config.window_below,
            window_above = config.window_above,
            "tile cache ready"
        );

        Ok(Self {
            index,
            config,
            params,
            scratch,
            pyramids: Arc::new(DashMap::new()),
            busy: Arc::new(AtomicBool::new(false)),
            building: Arc::new(Mutex::new(None)),
            stats: Arc::new(Mutex::new(CacheStats::new())),
            shutdown: CancellationToken::new(),
        })
    }

    /// Make `step` the current zoom step.
    ///
    /// If the step has no resident pyramid, a build is spawned on a
    /// background task; either way the refresh then evicts every resident
    /// step outside `[step - below, step + above]`. The returned
    /// [`RefreshOutcome::Started`] handle reports the build result - a
    /// failed build never mutates the cache map.
    ///
    /// Must be called within a tokio runtime.
    pub fn set_current_zoom_step(&self, step: i32) -> RefreshOutcome {
        if self.shutdown.is_cancelled() {
            return RefreshOutcome::ShutDown;
        }

        // One refresh at a time; the busy flag serializes build + evict.
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let in_flight = self
                .building
                .lock()
                .expect("building slot lock poisoned")
                .unwrap_or(step);
            if in_flight == step {
                debug!(step, "refresh already in flight for this step");
                return RefreshOutcome::AlreadyBuilding;
            }
            self.stats
                .lock()
                .expect("stats lock poisoned")
                .record_refresh_dropped();
            warn!(
                requested = step,
                in_flight, "refresh in flight; dropping request"
            );
            return RefreshOutcome::Dropped { in_flight };
        }
        *self.building.lock().expect("building slot lock poisoned") = Some(step);

        let index = self.index.clone();
        let params = self.params;
        let scratch = self.scratch.clone();
        let pyramids = self.pyramids.clone();
        let stats = self.stats.clone();
        let busy = self.busy.clone();
        let building = self.building.clone();
        let window = (self.config.window_below, self.config.window_above);

        let handle = tokio::spawn(async move {
            let result =
                Self::refresh(index, params, scratch, pyramids, stats, step, window).await;
            *building.lock().expect("building slot lock poisoned") = None;
            busy.store(false, Ordering::SeqCst);
            result
        });
        RefreshOutcome::Started(handle)
    }

    /// One full refresh: build the step's pyramid if absent, then apply
    /// window evictions.
    async fn refresh(
        index: Arc<SpatialIndex>,
        params: PyramidParams,
        scratch: Arc<ScratchStore>,
        pyramids: Arc<DashMap<i32, Arc<TilePyramid>>>,
        stats: Arc<Mutex<CacheStats>>,
        step: i32,
        (below, above): (u32, u32),
    ) -> Result<(), CacheError> {
        if !pyramids.contains_key(&step) {
            let build_index = index.clone();
            let build_scratch = scratch.clone();
            let built = tokio::task::spawn_blocking(move || {
                TilePyramid::build(&build_index, &params, step, &build_scratch)
            })
            .await;

            match built {
                Ok(Ok(pyramid)) => {
                    // Publish only now that the whole tree exists; readers
                    // never see a partial pyramid.
                    pyramids.insert(step, Arc::new(pyramid));
                    stats
                        .lock()
                        .expect("stats lock poisoned")
                        .record_pyramid_built();
                }
                Ok(Err(source)) => {
                    stats
                        .lock()
                        .expect("stats lock poisoned")
                        .record_build_failed();
                    if let Err(e) = scratch.remove_step(step) {
                        warn!(step, error = %e, "could not clean scratch after failed build");
                    }
                    error!(step, error = %source, "pyramid build failed");
                    return Err(CacheError::Build { step, source });
                }
                Err(join_err) => {
                    stats
                        .lock()
                        .expect("stats lock poisoned")
                        .record_build_failed();
                    error!(step, error = %join_err, "pyramid build task failed");
                    return Err(CacheError::TaskFailed(join_err.to_string()));
                }
            }
        }

        let low = step - below as i32;
        let high = step + above as i32;
        let stale: Vec<i32> = pyramids
            .iter()
            .map(|entry| *entry.key())
            .filter(|s| *s < low || *s > high)
            .collect();
        for stale_step in stale {
            if let Some((_, pyramid)) = pyramids.remove(&stale_step) {
                pyramid.dispose(&scratch);
                if let Err(e) = scratch.remove_step(stale_step) {
                    warn!(
                        step = stale_step,
                        error = %e,
                        "could not delete scratch directory on eviction"
                    );
                }
                stats
                    .lock()
                    .expect("stats lock poisoned")
                    .record_pyramid_evicted();
                info!(step = stale_step, "evicted tile pyramid");
            }
        }
        Ok(())
    }

    /// Leaf tiles of `step`'s pyramid intersecting `view`.
    ///
    /// Empty when the step has no resident pyramid; callers request a
    /// build explicitly via [`set_current_zoom_step`].
    ///
    /// [`set_current_zoom_step`]: TileCache::set_current_zoom_step
    pub fn intersecting(&self, step: i32, view: &PixelRect) -> Vec<Arc<LeafTile>> {
        match self.pyramids.get(&step) {
            Some(pyramid) => pyramid.intersecting(view),
            None => Vec::new(),
        }
    }

    /// The leaf of `step`'s pyramid containing `point`, if any.
    pub fn at_point(&self, step: i32, point: DrawPoint) -> Option<Arc<LeafTile>> {
        self.pyramids.get(&step)?.at_point(point)
    }

    /// The resident pyramid for `step`, if built.
    pub fn pyramid(&self, step: i32) -> Option<Arc<TilePyramid>> {
        self.pyramids.get(&step).map(|entry| entry.value().clone())
    }

    /// Zoom value for a step under this cache's zoom sequence.
    pub fn zoom_for(&self, step: i32) -> f64 {
        zoom_for_step(self.config.zoom_factor, step)
    }

    /// Resident zoom steps, ascending.
    pub fn resident_steps(&self) -> Vec<i32> {
        let mut steps: Vec<i32> = self.pyramids.iter().map(|entry| *entry.key()).collect();
        steps.sort_unstable();
        steps
    }

    pub fn is_resident(&self, step: i32) -> bool {
        self.pyramids.contains_key(&step)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// The scratch store leaf tiles persist through.
    pub fn scratch(&self) -> &ScratchStore {
        &self.scratch
    }

    /// Snapshot of cache statistics, including scratch I/O counters.
    pub fn stats(&self) -> CacheStats {
        let mut snapshot = self.stats.lock().expect("stats lock poisoned").clone();
        snapshot.tiles_persisted = self.scratch.tiles_persisted();
        snapshot.tiles_reloaded = self.scratch.tiles_reloaded();
        snapshot.bytes_persisted = self.scratch.bytes_persisted();
        snapshot
    }

    /// Refuse further refreshes.
    ///
    /// An in-flight build is not interrupted: it completes, is published,
    /// and simply becomes eligible for eviction - queries stay valid
    /// throughout.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        info!("tile cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::DrawRect;
    use crate::host::StaticHost;
    use crate::primitive::{Paint, Primitive, PrimitiveRef, RectShape};
    use crate::raster::{RasterSurface, RetryPolicy};
    use image::Rgba;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(temp: &TempDir) -> CacheConfig {
        CacheConfig::new()
            .with_leaf_tile_px(64)
            .with_scratch_dir(temp.path().join("tiles"))
            .with_retry(RetryPolicy {
                attempts: 2,
                delay: Duration::from_millis(1),
            })
    }

    fn small_index() -> Arc<SpatialIndex> {
        let prims: Vec<PrimitiveRef> = vec![Arc::new(RectShape::filled(
            DrawRect::new(10.0, 10.0, 60.0, 40.0),
            Paint::new(Rgba([200, 40, 40, 255]), 1.0),
        ))];
        Arc::new(SpatialIndex::build(
            &prims,
            DrawRect::new(0.0, 0.0, 100.0, 100.0),
            2,
        ))
    }

    async fn await_refresh(outcome: RefreshOutcome) {
        match outcome {
            RefreshOutcome::Started(handle) => handle.await.unwrap().unwrap(),
            other => panic!("expected Started, got {other:?}"),
        }
    }

    /// A primitive whose rendering takes long enough to observe an
    /// in-flight refresh from the test thread.
    struct SlowRect {
        inner: RectShape,
        delay: Duration,
    }

    impl Primitive for SlowRect {
        fn bounds(&self) -> DrawRect {
            self.inner.bounds()
        }

        fn render_into(&self, surface: &mut RasterSurface) {
            std::thread::sleep(self.delay);
            self.inner.render_into(surface);
        }
    }

    fn slow_index(delay: Duration) -> Arc<SpatialIndex> {
        let prims: Vec<PrimitiveRef> = vec![Arc::new(SlowRect {
            inner: RectShape::filled(DrawRect::new(0.0, 0.0, 50.0, 50.0), Paint::hairline()),
            delay,
        })];
        Arc::new(SpatialIndex::build(
            &prims,
            DrawRect::new(0.0, 0.0, 100.0, 100.0),
            0,
        ))
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn test_new_fails_without_texture_limit() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::without_texture_limit((800, 600));
        let result = TileCache::new(small_index(), &host, test_config(&temp));
        assert!(matches!(result, Err(CacheError::Host(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let config = test_config(&temp).with_zoom_factor(0.5);
        let result = TileCache::new(small_index(), &host, config);
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_clears_previous_scratch_state() {
        let temp = TempDir::new().unwrap();
        let stale_dir = temp.path().join("tiles").join("zs7");
        std::fs::create_dir_all(&stale_dir).unwrap();
        std::fs::write(stale_dir.join("r0_0_t0_0.raw"), b"previous run").unwrap();

        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();
        assert!(!cache.scratch().step_exists(7));
    }

    // =========================================================================
    // Refresh and residency
    // =========================================================================

    #[tokio::test]
    async fn test_set_step_builds_and_publishes() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        assert!(!cache.is_resident(0));
        await_refresh(cache.set_current_zoom_step(0)).await;

        assert!(cache.is_resident(0));
        assert_eq!(cache.resident_steps(), vec![0]);
        assert!(cache.scratch().step_exists(0));
        assert_eq!(cache.stats().pyramids_built, 1);
        assert!(!cache.is_busy());
    }

    #[tokio::test]
    async fn test_refresh_for_resident_step_only_evicts() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        await_refresh(cache.set_current_zoom_step(0)).await;
        await_refresh(cache.set_current_zoom_step(0)).await;
        assert_eq!(cache.stats().pyramids_built, 1);
    }

    #[tokio::test]
    async fn test_window_eviction_after_step_change() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let config = test_config(&temp).with_window(1, 1);
        let cache = TileCache::new(small_index(), &host, config).unwrap();

        await_refresh(cache.set_current_zoom_step(0)).await;
        await_refresh(cache.set_current_zoom_step(1)).await;
        assert_eq!(cache.resident_steps(), vec![0, 1]);

        // Moving to step 3 puts step 0 outside [2, 4]; step 1 too.
        await_refresh(cache.set_current_zoom_step(3)).await;
        assert_eq!(cache.resident_steps(), vec![3]);
        assert!(!cache.scratch().step_exists(0));
        assert!(!cache.scratch().step_exists(1));
        assert!(cache.scratch().step_exists(3));
        assert_eq!(cache.stats().pyramids_evicted, 2);
    }

    #[tokio::test]
    async fn test_competing_refresh_is_dropped_not_queued() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(
            slow_index(Duration::from_millis(300)),
            &host,
            test_config(&temp),
        )
        .unwrap();

        let first = cache.set_current_zoom_step(0);
        let handle = match first {
            RefreshOutcome::Started(h) => h,
            other => panic!("expected Started, got {other:?}"),
        };

        // Same step: no-op. Different step: dropped, not queued.
        assert!(matches!(
            cache.set_current_zoom_step(0),
            RefreshOutcome::AlreadyBuilding
        ));
        assert!(matches!(
            cache.set_current_zoom_step(5),
            RefreshOutcome::Dropped { in_flight: 0 }
        ));

        handle.await.unwrap().unwrap();
        assert!(cache.is_resident(0));
        assert!(!cache.is_resident(5));
        assert_eq!(cache.stats().refreshes_dropped, 1);

        // Re-issued after completion, the dropped request succeeds.
        await_refresh(cache.set_current_zoom_step(5)).await;
        assert!(cache.is_resident(5));
    }

    #[tokio::test]
    async fn test_failed_build_never_mutates_map() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        // Replace the scratch root with a plain file: the next build cannot
        // create its step directory.
        let root = cache.scratch().root().to_path_buf();
        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, b"blocked").unwrap();

        let outcome = cache.set_current_zoom_step(0);
        let handle = match outcome {
            RefreshOutcome::Started(h) => h,
            other => panic!("expected Started, got {other:?}"),
        };
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CacheError::Build { step: 0, .. })));

        assert!(!cache.is_resident(0));
        assert_eq!(cache.stats().builds_failed, 1);
        assert!(!cache.is_busy());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[tokio::test]
    async fn test_queries_on_absent_step_are_empty() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        assert!(cache.intersecting(9, &PixelRect::new(0, 0, 100, 100)).is_empty());
        assert!(cache.at_point(9, DrawPoint::new(50.0, 50.0)).is_none());
    }

    #[tokio::test]
    async fn test_queries_after_build() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        await_refresh(cache.set_current_zoom_step(0)).await;

        let pyramid = cache.pyramid(0).unwrap();
        let all = cache.intersecting(0, pyramid.dest_rect());
        assert_eq!(all.len(), pyramid.leaf_count());

        let leaf = cache.at_point(0, DrawPoint::new(20.0, 20.0)).unwrap();
        assert!(leaf.bounds().contains(DrawPoint::new(20.0, 20.0)));
    }

    #[tokio::test]
    async fn test_zoom_for_uses_configured_factor() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();
        assert_eq!(cache.zoom_for(0), 1.0);
        assert_eq!(cache.zoom_for(3), 2.197);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    #[tokio::test]
    async fn test_shutdown_refuses_new_refreshes() {
        let temp = TempDir::new().unwrap();
        let host = StaticHost::new(8192, (800, 600));
        let cache = TileCache::new(small_index(), &host, test_config(&temp)).unwrap();

        await_refresh(cache.set_current_zoom_step(0)).await;
        cache.shutdown();

        assert!(matches!(
            cache.set_current_zoom_step(1),
            RefreshOutcome::ShutDown
        ));
        // Residency and queries stay valid after shutdown.
        assert!(cache.is_resident(0));
    }
}
