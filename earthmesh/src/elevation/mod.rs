//! Ground elevation lookup for the region center.
//!
//! The region sphere is centered on the ground rather than on the ellipsoid
//! surface when the elevation service answers. Any failure (network, quota,
//! malformed body) falls back to an elevation of zero; the run never depends
//! on this service.

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::HttpClient;
use crate::tileset::KEY_PARAM;

/// Default Elevation API endpoint.
pub const DEFAULT_ELEVATION_URL: &str = "https://maps.googleapis.com/maps/api/elevation/json";

const STATUS_OK: &str = "OK";

#[derive(Debug, Deserialize)]
struct ElevationReply {
    status: String,
    #[serde(default)]
    results: Vec<ElevationResult>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: f64,
}

/// Client for the Elevation API.
pub struct ElevationService {
    client: Arc<dyn HttpClient>,
    api_key: String,
    endpoint: String,
}

impl ElevationService {
    /// Creates a service using the default endpoint.
    pub fn new(client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: DEFAULT_ELEVATION_URL.to_string(),
        }
    }

    /// Overrides the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_url(&self, lat: f64, lng: f64) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid elevation endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("locations", &format!("{},{}", lat, lng))
            .append_pair(KEY_PARAM, &self.api_key);
        Ok(url)
    }

    /// Looks up the ground elevation in meters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or a non-200 status and
    /// [`Error::Parse`] if the body is malformed, not `OK`, or has no result.
    pub async fn lookup(&self, lat: f64, lng: f64) -> Result<f64> {
        let url = self.request_url(lat, lng)?;
        let response = self.client.get(&url).await?.ensure_success(&url)?;

        let reply: ElevationReply = serde_json::from_slice(&response.body)
            .map_err(|e| Error::parse("elevation response", e))?;

        if reply.status != STATUS_OK {
            return Err(Error::parse(
                "elevation response",
                format!("status {}", reply.status),
            ));
        }

        reply
            .results
            .first()
            .map(|r| r.elevation)
            .ok_or_else(|| Error::parse("elevation response", "no results"))
    }

    /// Looks up the ground elevation, returning 0 on any failure.
    pub async fn elevation_or_zero(&self, lat: f64, lng: f64) -> f64 {
        match self.lookup(lat, lng).await {
            Ok(elevation) => {
                info!(elevation, "Found ground elevation");
                elevation
            }
            Err(e) => {
                warn!(error = %e, "Elevation lookup failed; using 0");
                0.0
            }
        }
    }
}
