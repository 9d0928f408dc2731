//! Point-query tests: feature-info URL mapping, the LocationInfo envelope
//! and the (URL, result) memo.

use std::sync::Arc;

use remote_raster::{Dataset, HttpFetcher, LocationQuery, TemplateDriver};

use super::test_utils::*;

fn info_url(z: i32, x: i64, y: i64, i: u32, j: u32) -> String {
    format!("http://tiles.test/info/{z}/{x}/{y}?i={i}&j={j}")
}

fn info_dataset(fetcher: Arc<dyn HttpFetcher>) -> Dataset {
    Dataset::new(
        base_config(256, 256, 1),
        Arc::new(
            TemplateDriver::new("http://tiles.test/{z}/{x}/{y}.png")
                .with_info_template("http://tiles.test/info/{z}/{x}/{y}?i={i}&j={j}"),
        ),
        fetcher,
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_xml_feature_info_embedded_verbatim() {
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &info_url(0, 0, 0, 10, 20),
        200,
        b"<FeatureInfo><value>42</value></FeatureInfo>".to_vec(),
    ));
    let ds = info_dataset(fetcher);

    let info = ds
        .location_info(LocationQuery::Pixel(10, 20))
        .await
        .unwrap();
    assert_eq!(
        info.as_deref(),
        Some("<LocationInfo><FeatureInfo><value>42</value></FeatureInfo></LocationInfo>")
    );
}

#[tokio::test]
async fn test_plain_text_feature_info_escaped() {
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &info_url(0, 0, 0, 0, 0),
        200,
        b"depth > 10".to_vec(),
    ));
    let ds = info_dataset(fetcher);

    let info = ds.location_info(LocationQuery::Pixel(0, 0)).await.unwrap();
    assert_eq!(
        info.as_deref(),
        Some("<LocationInfo>depth &gt; 10</LocationInfo>")
    );
}

#[tokio::test]
async fn test_repeat_query_served_from_memo() {
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &info_url(0, 0, 0, 10, 20),
        200,
        b"<a>1</a>".to_vec(),
    ));
    let ds = info_dataset(fetcher.clone());

    let first = ds.location_info(LocationQuery::Pixel(10, 20)).await.unwrap();
    let second = ds.location_info(LocationQuery::Pixel(10, 20)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.request_count().await, 1);

    // A different pixel produces a different URL and a fresh fetch
    ds.location_info(LocationQuery::Pixel(11, 20)).await.unwrap();
    assert_eq!(fetcher.request_count().await, 2);
}

#[tokio::test]
async fn test_geographic_query_maps_through_the_window() {
    // 360x180 degrees over 256x256 pixels: (1.0, 1.0) lands on pixel (0, 1)
    let fetcher = Arc::new(TrackingFetcher::new().with_response(
        &info_url(0, 0, 0, 0, 1),
        200,
        b"<a>1</a>".to_vec(),
    ));
    let ds = info_dataset(fetcher.clone());

    let info = ds
        .location_info(LocationQuery::Geo(1.0, 1.0))
        .await
        .unwrap();
    assert!(info.is_some());
    assert_eq!(fetcher.requests().await, vec![info_url(0, 0, 0, 0, 1)]);
}

#[tokio::test]
async fn test_query_outside_raster_is_none() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = info_dataset(fetcher.clone());

    assert!(ds
        .location_info(LocationQuery::Pixel(300, 0))
        .await
        .unwrap()
        .is_none());
    assert!(ds
        .location_info(LocationQuery::Geo(-10.0, 5.0))
        .await
        .unwrap()
        .is_none());
    assert_eq!(fetcher.request_count().await, 0);
}

#[tokio::test]
async fn test_service_without_getinfo_is_none() {
    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = make_dataset(base_config(256, 256, 1), fetcher.clone(), None);

    assert!(ds
        .location_info(LocationQuery::Pixel(0, 0))
        .await
        .unwrap()
        .is_none());
    assert_eq!(fetcher.request_count().await, 0);
}

#[tokio::test]
async fn test_failed_fetch_memoized_as_none() {
    // The transport default-responds 404
    let fetcher = Arc::new(TrackingFetcher::new());
    let ds = info_dataset(fetcher.clone());

    assert!(ds
        .location_info(LocationQuery::Pixel(10, 20))
        .await
        .unwrap()
        .is_none());
    assert!(ds
        .location_info(LocationQuery::Pixel(10, 20))
        .await
        .unwrap()
        .is_none());
    assert_eq!(fetcher.request_count().await, 1);
}
