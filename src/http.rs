//! HTTP fetch contract.
//!
//! The engine never talks to the network itself: it hands a batch of
//! independent tile requests to an [`HttpFetcher`] and waits for all results.
//! Connection pooling, TLS and batch-internal parallelism (bounded by
//! [`HttpOptions::max_connections`](crate::config::HttpOptions)) belong to
//! the implementation behind this trait.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::config::HttpOptions;

/// One queued tile fetch. Created per tile needed, discarded after the
/// batch result is reconciled.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Tile grid coordinates, kept for error reporting
    pub x: i64,
    pub y: i64,

    /// Resolved tile URL
    pub url: Url,

    /// Optional byte range within the resource, as (offset, length)
    pub byte_range: Option<(u64, u64)>,

    /// Options the transport must honor for this request
    pub options: HttpOptions,
}

/// Result of one fetch, parallel to its request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code; 0 when no response was received at all
    pub status: u16,

    /// Response body
    pub body: Bytes,

    /// Transport-level error text, empty on success
    pub error: String,
}

impl FetchResponse {
    /// A response for a transport failure with no HTTP status.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: Bytes::new(),
            error: message.into(),
        }
    }

    /// A plain success with the given body.
    pub fn ok(body: Bytes) -> Self {
        Self {
            status: 200,
            body,
            error: String::new(),
        }
    }
}

/// Trait executing tile fetches on behalf of the engine.
///
/// `fetch_batch` receives N independent requests and must return exactly N
/// results in the same order; it must not fail as a whole because individual
/// requests failed (failures are per-slot, via status/error). Implementations
/// may parallelize internally. `fetch` is the single synchronous-style call
/// used for point queries.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Execute all requests and return one response per request, in order.
    async fn fetch_batch(&self, requests: &[FetchRequest]) -> Vec<FetchResponse>;

    /// Execute one request outside any batch.
    async fn fetch(&self, url: &Url, options: &HttpOptions) -> FetchResponse;
}
