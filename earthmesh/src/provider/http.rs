//! HTTP client abstraction for testability

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::tileset::redacted;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns true for a 200 response.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Returns true if the server declared a JSON body.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }

    /// Converts a non-200 response into a transport error.
    pub fn ensure_success(self, url: &Url) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::transport(redacted(url), format!("HTTP {}", self.status)))
        }
    }
}

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
///
/// # Dyn Compatibility
///
/// `get` returns a boxed future so the client can be shared as
/// `Arc<dyn HttpClient>` across spawned tasks.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request, credentials included
    ///
    /// # Returns
    ///
    /// The response for any status code, or a transport error if no response
    /// was received.
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<HttpResponse>>;
}

/// Real HTTP client implementation using reqwest.
///
/// Connections are pooled and kept alive across requests.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("earthmesh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<HttpResponse>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::transport(redacted(url), e.without_url()))?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response
                .bytes()
                .await
                .map_err(|e| Error::transport(redacted(url), e.without_url()))?;

            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        })
    }
}
