//! Window-read tests: decode, assembly, remapping, cache reconciliation and
//! failure handling.

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use remote_raster::{
    CacheItemStatus, ColorTable, Dataset, MemoryTileCache, PixelType, ReadError, TileCache,
};

use super::test_utils::*;

#[tokio::test]
async fn test_read_decodes_single_tile() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png(256, 256, 42)),
    );
    let ds = make_dataset(base_config(256, 256, 1), fetcher.clone(), None);

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert_eq!(out.len(), 256 * 256);
    assert!(out.iter().all(|&v| v == 42));
    assert_eq!(fetcher.batch_count(), 1);
    assert_eq!(fetcher.request_count().await, 1);
}

#[tokio::test]
async fn test_hinted_window_read_uses_one_batch() {
    // Four blocks, each tile a distinct value keyed by its grid position
    let mut fetcher = TrackingFetcher::new();
    for y in 0..2 {
        for x in 0..2 {
            fetcher = fetcher.with_tile(&tile_url(0, x, y), gray_png(256, 256, (10 + x + 2 * y) as u8));
        }
    }
    let fetcher = Arc::new(fetcher);
    let ds = make_dataset(base_config(512, 512, 1), fetcher.clone(), None);

    let out = ds.read_window(0, None, 0, 0, 512, 512).await.unwrap();

    // The hint clusters all four tiles into the first block's fetch
    assert_eq!(fetcher.batch_count(), 1);
    assert_eq!(fetcher.request_count().await, 4);

    // Window assembly stitched the right tile into each quadrant
    assert_eq!(out[0], 10);
    assert_eq!(out[511], 11);
    assert_eq!(out[511 * 512], 12);
    assert_eq!(out[511 * 512 + 511], 13);
}

#[tokio::test]
async fn test_subwindow_assembly() {
    let fetcher = Arc::new(
        TrackingFetcher::new()
            .with_tile(&tile_url(0, 0, 0), gray_png(256, 256, 1))
            .with_tile(&tile_url(0, 1, 0), gray_png(256, 256, 2)),
    );
    let ds = make_dataset(base_config(512, 256, 1), fetcher, None);

    // A window straddling the two tiles' shared edge
    let out = ds.read_window(0, None, 254, 10, 4, 2).await.unwrap();
    assert_eq!(out, vec![1, 1, 2, 2, 1, 1, 2, 2]);
}

#[tokio::test]
async fn test_zero_block_status_fills_nodata() {
    let mut config = base_config(256, 256, 2);
    config.zero_block_codes.insert(404);
    config.nodata = vec![7.0];

    // The transport default-responds 404 to every URL
    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = make_dataset(config, fetcher, None);

    for band in 0..2 {
        let out = ds.read_window(band, None, 0, 0, 256, 256).await.unwrap();
        assert_eq!(out.len(), 256 * 256);
        assert!(out.iter().all(|&v| v == 7));
    }
}

#[tokio::test]
async fn test_unlisted_status_is_hard_failure() {
    // 404 is not in the default zero-block set {204}
    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = make_dataset(base_config(256, 256, 1), fetcher, None);

    match ds.read_window(0, None, 0, 0, 256, 256).await {
        Err(ReadError::Download { x, y, status, .. }) => {
            assert_eq!((x, y, status), (0, 0, 404));
        }
        other => panic!("expected Download error, got {:?}", other.map(|v| v.len())),
    }
}

#[tokio::test]
async fn test_server_error_status_is_hard_failure() {
    let mut config = base_config(256, 256, 1);
    config.zero_block_codes.insert(404);

    let fetcher = Arc::new(TrackingFetcher::new().with_response(&tile_url(0, 0, 0), 500, Vec::new()));
    let ds = make_dataset(config, fetcher, None);

    assert!(matches!(
        ds.read_window(0, None, 0, 0, 256, 256).await,
        Err(ReadError::Download { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_cached_tile_survives_dead_transport() {
    let cache = Arc::new(MemoryTileCache::new());
    let url = Url::parse(&tile_url(0, 0, 0)).unwrap();
    cache.insert(&url, Bytes::from(gray_png(256, 256, 42))).await;

    let ds = make_dataset(
        base_config(256, 256, 1),
        Arc::new(FailingFetcher),
        Some(cache),
    );

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 42));
}

#[tokio::test]
async fn test_cached_tile_short_circuits_network() {
    let cache = Arc::new(MemoryTileCache::new());
    let url = Url::parse(&tile_url(0, 0, 0)).unwrap();
    cache.insert(&url, Bytes::from(gray_png(256, 256, 9))).await;

    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = make_dataset(base_config(256, 256, 1), fetcher.clone(), Some(cache));

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 9));
    assert_eq!(fetcher.request_count().await, 0);
}

#[tokio::test]
async fn test_successful_download_populates_cache() {
    let cache = Arc::new(MemoryTileCache::new());
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png(256, 256, 1)),
    );
    let ds = make_dataset(base_config(256, 256, 1), fetcher, Some(cache.clone()));

    ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();

    let url = Url::parse(&tile_url(0, 0, 0)).unwrap();
    assert_eq!(cache.item_status(&url).await, CacheItemStatus::Ok);
}

#[tokio::test]
async fn test_sibling_piggy_back_fetches_once() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), rgb_png(256, 256, [10, 20, 30])),
    );
    let ds = make_dataset(base_config(256, 256, 3), fetcher.clone(), None);

    let red = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(red.iter().all(|&v| v == 10));
    assert_eq!(fetcher.request_count().await, 1);

    // The first read left every band's block resident
    let green = ds.read_window(1, None, 0, 0, 256, 256).await.unwrap();
    let blue = ds.read_window(2, None, 0, 0, 256, 256).await.unwrap();
    assert!(green.iter().all(|&v| v == 20));
    assert!(blue.iter().all(|&v| v == 30));
    assert_eq!(fetcher.request_count().await, 1);
}

#[tokio::test]
async fn test_remap_gray_tile_into_four_bands() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png(256, 256, 9)),
    );
    let ds = make_dataset(base_config(256, 256, 4), fetcher, None);

    for band in 0..3 {
        let out = ds.read_window(band, None, 0, 0, 256, 256).await.unwrap();
        assert!(out.iter().all(|&v| v == 9), "band {band} should carry the gray value");
    }
    // The synthetic alpha band is fully opaque
    let alpha = ds.read_window(3, None, 0, 0, 256, 256).await.unwrap();
    assert!(alpha.iter().all(|&v| v == 255));
}

#[tokio::test]
async fn test_remap_rgb_tile_into_two_bands() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), rgb_png(256, 256, [10, 20, 30])),
    );
    let ds = make_dataset(base_config(256, 256, 2), fetcher, None);

    let luma = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(luma.iter().all(|&v| v == 10));
    let alpha = ds.read_window(1, None, 0, 0, 256, 256).await.unwrap();
    assert!(alpha.iter().all(|&v| v == 255));
}

#[tokio::test]
async fn test_color_table_expansion() {
    let mut config = base_config(256, 256, 3);
    config.color_table = Some(ColorTable::new(vec![[1, 2, 3, 255], [5, 6, 7, 255]]));

    // All pixels index 1, except the first which is past the table's end
    let mut indices = vec![1u8; 256 * 256];
    indices[0] = 2;
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png_with(256, 256, &indices)),
    );
    let ds = make_dataset(config, fetcher, None);

    let expected = [5u8, 6, 7];
    for (band, &value) in expected.iter().enumerate() {
        let out = ds.read_window(band, None, 0, 0, 256, 256).await.unwrap();
        // Missing table entries expand to 0 in every component
        assert_eq!(out[0], 0);
        assert!(out[1..].iter().all(|&v| v == value));
    }
}

#[tokio::test]
async fn test_exception_body_with_http_200_fails() {
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &tile_url(0, 0, 0),
        200,
        exception_body("LayerNotDefined", "No such layer"),
    ));
    let ds = make_dataset(base_config(256, 256, 1), fetcher, None);

    match ds.read_window(0, None, 0, 0, 256, 256).await {
        Err(ReadError::ServiceException { code, message }) => {
            assert_eq!(code.as_deref(), Some("LayerNotDefined"));
            assert_eq!(message, "No such layer");
        }
        other => panic!("expected ServiceException, got {:?}", other.map(|v| v.len())),
    }
}

#[tokio::test]
async fn test_exception_downgraded_to_empty_block() {
    let mut config = base_config(256, 256, 1);
    config.zero_block_on_exception = true;

    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &tile_url(0, 0, 0),
        200,
        exception_body("LayerNotDefined", "No such layer"),
    ));
    let ds = make_dataset(config, fetcher, None);

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 0));
}

#[tokio::test]
async fn test_undecodable_body_fails_without_poisoning_cache() {
    let cache = Arc::new(MemoryTileCache::new());
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &tile_url(0, 0, 0),
        200,
        b"this is definitely not an image tile".to_vec(),
    ));
    let ds = make_dataset(base_config(256, 256, 1), fetcher, Some(cache.clone()));

    assert!(matches!(
        ds.read_window(0, None, 0, 0, 256, 256).await,
        Err(ReadError::Decode { .. })
    ));

    let url = Url::parse(&tile_url(0, 0, 0)).unwrap();
    assert_eq!(cache.item_status(&url).await, CacheItemStatus::Missing);
}

#[tokio::test]
async fn test_empty_success_body_is_a_failure() {
    let fetcher = Arc::new(TrackingFetcher::new().with_response(&tile_url(0, 0, 0), 200, Vec::new()));
    let ds = make_dataset(base_config(256, 256, 1), fetcher, None);

    assert!(matches!(
        ds.read_window(0, None, 0, 0, 256, 256).await,
        Err(ReadError::Download { status: 200, .. })
    ));
}

#[tokio::test]
async fn test_partial_content_with_byte_range() {
    let url = Url::parse("http://tiles.test/archive.bin").unwrap();
    let fetcher = Arc::new(
        TrackingFetcher::new().with_response(url.as_str(), 206, gray_png(256, 256, 4)),
    );

    let ds = Dataset::new(
        base_config(256, 256, 1),
        Arc::new(RangeTileDriver {
            url: url.clone(),
            byte_range: Some((0, 1000)),
        }),
        fetcher,
        None,
    )
    .unwrap();

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 4));
}

#[tokio::test]
async fn test_partial_content_without_declared_range_fails() {
    let url = Url::parse("http://tiles.test/archive.bin").unwrap();
    let fetcher = Arc::new(
        TrackingFetcher::new().with_response(url.as_str(), 206, gray_png(256, 256, 4)),
    );

    let ds = Dataset::new(
        base_config(256, 256, 1),
        Arc::new(RangeTileDriver {
            url,
            byte_range: None,
        }),
        fetcher,
        None,
    )
    .unwrap();

    assert!(matches!(
        ds.read_window(0, None, 0, 0, 256, 256).await,
        Err(ReadError::Download { status: 206, .. })
    ));
}

#[tokio::test]
async fn test_offline_reads_resolve_to_nodata() {
    let mut config = base_config(256, 256, 1);
    config.offline = true;
    config.nodata = vec![3.0];

    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = make_dataset(config, fetcher.clone(), None);

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 3));
    assert_eq!(fetcher.request_count().await, 0);
}

#[tokio::test]
async fn test_u16_tile_copied_as_stored() {
    let mut config = base_config(256, 256, 1);
    config.pixel_type = PixelType::U16;

    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray16_png(256, 256, 1000)),
    );
    let ds = make_dataset(config, fetcher, None);

    let out = ds.read_window(0, None, 0, 0, 256, 256).await.unwrap();
    assert_eq!(out.len(), 256 * 256 * 2);
    for sample in out.chunks_exact(2) {
        assert_eq!(u16::from_ne_bytes([sample[0], sample[1]]), 1000);
    }
}

#[tokio::test]
async fn test_undersized_tile_is_rejected() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png(64, 64, 1)),
    );
    let ds = make_dataset(base_config(256, 256, 1), fetcher, None);

    assert!(matches!(
        ds.read_window(0, None, 0, 0, 256, 256).await,
        Err(ReadError::BlockSize {
            sx: 64,
            sy: 64,
            esx: 256,
            esy: 256,
            ..
        })
    ));
}

#[tokio::test]
async fn test_overview_read_shifts_tile_level() {
    let mut config = base_config(512, 512, 1);
    config.data_window.tlevel = 1;
    config.overviews = Some(1);

    // The overview halves the raster to one 256-pixel block at level 0
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), gray_png(256, 256, 5)),
    );
    let ds = make_dataset(config, fetcher.clone(), None);

    let out = ds.read_window(0, Some(0), 0, 0, 256, 256).await.unwrap();
    assert!(out.iter().all(|&v| v == 5));
    assert_eq!(fetcher.requests().await, vec![tile_url(0, 0, 0)]);
}

#[tokio::test]
async fn test_read_bands_window() {
    let fetcher = Arc::new(
        TrackingFetcher::new().with_tile(&tile_url(0, 0, 0), rgb_png(256, 256, [10, 20, 30])),
    );
    let ds = make_dataset(base_config(256, 256, 3), fetcher.clone(), None);

    let bands = ds.read_bands_window(0, 0, 128, 128).await.unwrap();
    assert_eq!(bands.len(), 3);
    assert!(bands[0].iter().all(|&v| v == 10));
    assert!(bands[1].iter().all(|&v| v == 20));
    assert!(bands[2].iter().all(|&v| v == 30));
    assert_eq!(fetcher.request_count().await, 1);
}
