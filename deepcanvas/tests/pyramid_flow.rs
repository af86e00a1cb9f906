//! Integration tests for the full pan/zoom tile pipeline.
//!
//! These drive the public surface end to end:
//! - document model -> spatial index -> cache construction
//! - zoom step refreshes building pyramids in the background
//! - viewport and hit-test queries against resident pyramids
//! - window eviction and scratch directory lifecycle

use std::sync::Arc;
use std::time::Duration;

use deepcanvas::cache::{CacheConfig, CacheError, RefreshOutcome, TileCache};
use deepcanvas::geom::{DrawPoint, DrawRect, PixelRect};
use deepcanvas::host::StaticHost;
use deepcanvas::primitive::{Drawing, EllipseShape, Layer, LineSegment, Paint, RectShape};
use deepcanvas::raster::RetryPolicy;
use deepcanvas::spatial::SpatialIndex;
use image::Rgba;
use tempfile::TempDir;

const INK: Rgba<u8> = Rgba([20, 20, 160, 255]);

/// A floor-plan-like document: 1000 x 500 drawing units.
fn floor_plan() -> Drawing {
    let mut drawing = Drawing::new();

    let mut walls = Layer::new("walls");
    walls.push(Arc::new(RectShape::outline(
        DrawRect::new(0.0, 0.0, 1000.0, 500.0),
        Paint::new(INK, 2.0),
    )));
    walls.push(Arc::new(LineSegment::new(
        DrawPoint::new(500.0, 10.0),
        DrawPoint::new(500.0, 490.0),
        Paint::new(INK, 2.0),
    )));
    drawing.add_layer(walls);

    let mut fixtures = Layer::new("fixtures");
    for i in 0..20 {
        let x = 40.0 + i as f64 * 47.0;
        fixtures.push(Arc::new(EllipseShape::new(
            DrawPoint::new(x, 250.0),
            12.0,
            12.0,
            Paint::new(INK, 1.0),
        )));
    }
    drawing.add_layer(fixtures);

    drawing
}

fn build_cache(temp: &TempDir, drawing: &Drawing) -> TileCache {
    let index = Arc::new(SpatialIndex::build(
        &drawing.visible_primitives(),
        drawing.extents(),
        4,
    ));
    let host = StaticHost::new(8192, (1920, 1080));
    let config = CacheConfig::new()
        .with_window(1, 1)
        .with_scratch_dir(temp.path().join("tiles"))
        .with_retry(RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(2),
        });
    TileCache::new(index, &host, config).expect("cache construction")
}

async fn refresh(cache: &TileCache, step: i32) {
    match cache.set_current_zoom_step(step) {
        RefreshOutcome::Started(handle) => handle.await.unwrap().unwrap(),
        other => panic!("expected Started, got {other:?}"),
    }
}

#[tokio::test]
async fn test_small_drawing_builds_single_root() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;

    // 1000 x 500 drawing units at zoom 1 fit one 8192 px texture.
    let pyramid = cache.pyramid(0).expect("resident pyramid");
    assert_eq!(pyramid.root_split(), 1);
    assert_eq!(pyramid.roots().len(), 1);
    assert_eq!(pyramid.overall_px(), (1000, 500));
}

#[tokio::test]
async fn test_viewport_query_returns_compositable_tiles() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;

    let viewport = PixelRect::new(0, 0, 640, 480);
    let tiles = cache.intersecting(0, &viewport);
    assert!(!tiles.is_empty());

    for tile in &tiles {
        assert!(tile.dest_rect().intersects(&viewport));
        let bitmap = tile.bitmap().expect("leaf loaded after build");
        assert_eq!(bitmap.width(), tile.dest_rect().width);
        assert_eq!(bitmap.height(), tile.dest_rect().height);
    }

    // Every leaf stays under the hardware texture limit.
    let all = cache.intersecting(0, cache.pyramid(0).unwrap().dest_rect());
    for tile in &all {
        assert!(tile.dest_rect().width <= 8192);
        assert!(tile.dest_rect().height <= 8192);
    }
}

#[tokio::test]
async fn test_hit_test_finds_primitives_at_point() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;

    // The center divider wall runs through x = 500.
    let leaf = cache
        .at_point(0, DrawPoint::new(500.0, 250.0))
        .expect("leaf at divider");
    assert!(leaf
        .primitives()
        .iter()
        .any(|p| p.bounds().contains(DrawPoint::new(500.0, 250.0))));

    // Outside the drawing there is no tile at all.
    assert!(cache.at_point(0, DrawPoint::new(5000.0, 5000.0)).is_none());
}

#[tokio::test]
async fn test_window_slides_and_deletes_scratch() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;
    refresh(&cache, 1).await;
    assert_eq!(cache.resident_steps(), vec![0, 1]);
    assert!(cache.scratch().step_exists(0));

    // Window is [s-1, s+1]: moving to 3 evicts steps 0 and 1.
    refresh(&cache, 3).await;
    assert_eq!(cache.resident_steps(), vec![3]);
    assert!(!cache.scratch().step_exists(0));
    assert!(!cache.scratch().step_exists(1));

    // Queries against evicted steps degrade to empty results.
    assert!(cache
        .intersecting(0, &PixelRect::new(0, 0, 100, 100))
        .is_empty());
}

#[tokio::test]
async fn test_rebuild_never_observes_leftover_files() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;
    refresh(&cache, 2).await; // evicts step 0, deleting zs0 entirely
    assert!(!cache.scratch().step_exists(0));

    // Plant a foreign file where a prior build might have left one.
    let step_dir = cache.scratch().step_dir(0);
    std::fs::create_dir_all(&step_dir).unwrap();
    let stale = step_dir.join("r0_0_t0_0.raw");
    std::fs::write(&stale, b"stale bytes from another primitive set").unwrap();

    refresh(&cache, 0).await;

    // The rebuild wiped the directory before writing its own tiles; every
    // tile loads cleanly at its expected size.
    let pyramid = cache.pyramid(0).unwrap();
    let tiles = cache.intersecting(0, pyramid.dest_rect());
    assert_eq!(tiles.len(), pyramid.leaf_count());
    for tile in &tiles {
        let bitmap = tile.bitmap().unwrap();
        assert_eq!(
            bitmap.as_raw().len(),
            tile.dest_rect().area() as usize * 4
        );
    }
}

#[tokio::test]
async fn test_unload_reload_preserves_pixels() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;

    let leaf = cache
        .at_point(0, DrawPoint::new(40.0, 250.0))
        .expect("leaf under first fixture");
    let before = leaf.bitmap().unwrap().as_raw().clone();
    assert!(before.iter().any(|b| *b != 0), "fixture ink rendered");

    leaf.unload();
    assert!(!leaf.is_loaded());

    let reloaded = leaf.reload(cache.scratch()).unwrap();
    assert_eq!(*reloaded.as_raw(), before);
}

#[tokio::test]
async fn test_zoomed_step_splits_into_more_roots() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();

    let index = Arc::new(SpatialIndex::build(
        &drawing.visible_primitives(),
        drawing.extents(),
        4,
    ));
    // A tiny texture limit stands in for a high zoom step: the overall
    // extent must split across several roots.
    let host = StaticHost::new(256, (1920, 1080));
    let config = CacheConfig::new()
        .with_window(0, 0)
        .with_leaf_tile_px(128)
        .with_scratch_dir(temp.path().join("tiles"));
    let cache = TileCache::new(index, &host, config).unwrap();

    refresh(&cache, 0).await;

    let pyramid = cache.pyramid(0).unwrap();
    // ceil(1000 / 256) = 4, already a power of two.
    assert_eq!(pyramid.root_split(), 4);
    assert_eq!(pyramid.roots().len(), 16);

    // Root destination rects partition the overall extent exactly.
    let total: u64 = pyramid.roots().iter().map(|r| r.dest_rect().area()).sum();
    assert_eq!(total, pyramid.dest_rect().area());
}

#[tokio::test]
async fn test_empty_drawing_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let drawing = Drawing::new();
    let cache = build_cache(&temp, &drawing);

    refresh(&cache, 0).await;

    let pyramid = cache.pyramid(0).expect("blank pyramid");
    assert_eq!(pyramid.overall_px(), (1, 1));
    let tiles = cache.intersecting(0, pyramid.dest_rect());
    assert_eq!(tiles.len(), 1);
    assert!(tiles[0].bitmap().unwrap().pixels().all(|p| p.0[3] == 0));
}

#[tokio::test]
async fn test_build_failure_surfaces_through_handle() {
    let temp = TempDir::new().unwrap();
    let drawing = floor_plan();
    let cache = build_cache(&temp, &drawing);

    // Replace the scratch root with a file so the build cannot stage tiles.
    let root = cache.scratch().root().to_path_buf();
    std::fs::remove_dir_all(&root).unwrap();
    std::fs::write(&root, b"blocked").unwrap();

    let handle = match cache.set_current_zoom_step(0) {
        RefreshOutcome::Started(handle) => handle,
        other => panic!("expected Started, got {other:?}"),
    };
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(CacheError::Build { step: 0, .. })));
    assert!(!cache.is_resident(0));

    // The cache recovers once the path is usable again.
    std::fs::remove_file(&root).unwrap();
    refresh(&cache, 0).await;
    assert!(cache.is_resident(0));
}
