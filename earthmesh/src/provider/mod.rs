//! HTTP boundary for tileset, asset and elevation requests.
//!
//! All network access goes through the [`HttpClient`] trait so the traversal
//! and pipeline can be driven by a mock in tests:
//!
//! ```ignore
//! use earthmesh::provider::{HttpClient, ReqwestClient};
//!
//! let client = ReqwestClient::with_timeout(30)?;
//! let response = client.get(&url).await?.ensure_success(&url)?;
//! ```

mod http;

pub use http::{BoxFuture, HttpClient, HttpResponse, ReqwestClient, DEFAULT_TIMEOUT_SECS};

#[cfg(test)]
pub use http::tests::MockHttpClient;
