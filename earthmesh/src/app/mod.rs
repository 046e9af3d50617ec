//! Run orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EarthMesh::run                       │
//! │                                                             │
//! │  1. RunConfig::validate ───────► Config errors, fatal       │
//! │  2. AssetCache::prepare ───────► output directory           │
//! │  3. ElevationService ──────────► ground height (or 0)       │
//! │  4. RegionQuery ───────────────► region sphere (ECEF)       │
//! │  5. TileTreeWalker::collect ───► leaf URLs (root fatal)     │
//! │  6. DownloadPipeline::run ─────► aligned tiles on disk      │
//! │  7. DOWNLOADED_TILES ──────────► contract log               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use earthmesh::app::EarthMesh;
//! use earthmesh::config::RunConfig;
//!
//! let config = RunConfig::new(key, 40.7128, -74.0060, 200.0, "./tiles");
//! let summary = EarthMesh::from_config(&config)?.run(&config).await?;
//! ```

use std::sync::Arc;

use glam::DVec3;
use tracing::info;

use crate::cache::AssetCache;
use crate::config::RunConfig;
use crate::culling::RegionQuery;
use crate::elevation::ElevationService;
use crate::error::Result;
use crate::pipeline::{DownloadPipeline, PipelineStats};
use crate::provider::{HttpClient, ReqwestClient};
use crate::report::ReportWriter;
use crate::tileset::{TileTreeWalker, TraversalStats};

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// File names listed in `DOWNLOADED_TILES`.
    pub files: Vec<String>,
    /// The shared origin, if one was established.
    pub origin: Option<DVec3>,
    /// Ground elevation used for the region center.
    pub elevation: f64,
    pub traversal: TraversalStats,
    pub pipeline: PipelineStats,
}

/// Entry point tying the components together.
pub struct EarthMesh {
    client: Arc<dyn HttpClient>,
    report: ReportWriter,
}

impl EarthMesh {
    /// Creates an instance with an explicit client and contract log.
    pub fn new(client: Arc<dyn HttpClient>, report: ReportWriter) -> Self {
        Self { client, report }
    }

    /// Creates an instance using reqwest and stdout.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let client = ReqwestClient::with_timeout(config.timeout_secs)?;
        Ok(Self::new(Arc::new(client), ReportWriter::stdout()))
    }

    /// Runs one complete retrieval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings,
    /// [`Error::AssetIo`](crate::Error::AssetIo) if the output directory
    /// cannot be created, and [`Error::Transport`](crate::Error::Transport) or
    /// [`Error::Parse`](crate::Error::Parse) if the root tileset is
    /// unavailable. Anything failing below the root only shrinks the result.
    pub async fn run(&self, config: &RunConfig) -> Result<RunSummary> {
        config.validate()?;
        let root_url = config.root_url()?;

        let cache = AssetCache::new(&config.output_dir);
        cache.prepare().await?;

        let elevation = ElevationService::new(Arc::clone(&self.client), config.api_key.clone())
            .elevation_or_zero(config.latitude, config.longitude)
            .await;

        let region =
            RegionQuery::from_degrees(config.longitude, config.latitude, elevation, config.radius);
        info!(
            lat = config.latitude,
            lng = config.longitude,
            radius = config.radius,
            "Gathering tiles in region"
        );

        let walker = TileTreeWalker::new(
            Arc::clone(&self.client),
            config.api_key.clone(),
            region.sphere(),
            config.traversal_concurrency,
        );
        let traversal = walker.collect(&root_url).await?;
        info!(count = traversal.leaves.len(), "Found leaf tiles");

        let pipeline = DownloadPipeline::new(
            Arc::clone(&self.client),
            cache,
            self.report.clone(),
            config.origin,
            config.parallel,
        );
        let outcome = pipeline.run(traversal.leaves).await;

        self.report.downloaded(&outcome.files);

        Ok(RunSummary {
            files: outcome.files,
            origin: outcome.origin,
            elevation,
            traversal: traversal.stats,
            pipeline: outcome.stats,
        })
    }
}
