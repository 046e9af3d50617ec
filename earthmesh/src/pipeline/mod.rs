//! Fetch → align → persist pipeline for leaf tiles.
//!
//! # Phases
//!
//! ```text
//! leaves: [L0, L1, L2, ... Ln]
//!
//! Phase A (no explicit origin):      Phase B:
//!   L0 ─► origin set? ── yes ──────►   JoinSet, Semaphore(parallel)
//!          │ no                          L1  L2  ...  Ln   (any order)
//!          ▼                              │   │        │
//!   L1 ─► origin set? ...                 └───┴── shared origin (read-only)
//! ```
//!
//! Without an explicit origin, leaves are processed one at a time until one
//! of them establishes the origin; normally that is the very first leaf,
//! but a leaf that fails or has no position hands the barrier to the next.
//! Every remaining leaf then runs concurrently against the now-final origin.
//! With an explicit origin, Phase A is skipped.
//!
//! # Per-leaf Steps
//!
//! 1. Stored file exists → load it and recover its original position;
//!    otherwise fetch, decode, and capture the original position.
//! 2. Offer the original position to the [`OriginCoordinator`]; the caller
//!    that establishes it announces `ORIGIN_TRANSLATION`.
//! 3. Align against the shared origin. Newly fetched tiles are rewritten
//!    and stored; stored tiles are left as they are.
//! 4. Report `ASSET_COPYRIGHT` and `TILE_TRANSLATION`, record the file name.
//!
//! A failing leaf is logged and left out of the results; siblings continue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::align::FrameAligner;
use crate::asset::{AssetSource, TileAsset};
use crate::cache::AssetCache;
use crate::error::{Error, Result};
use crate::glb::GlbDocument;
use crate::origin::OriginCoordinator;
use crate::provider::HttpClient;
use crate::report::ReportWriter;
use crate::tileset::redacted;

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Tiles downloaded, aligned and written.
    pub fetched: usize,
    /// Tiles found in the output directory and reused.
    pub reused: usize,
    /// Tiles excluded because of an error.
    pub failed: usize,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Output file names, in completion order, without duplicates.
    pub files: Vec<String>,
    /// The shared origin, if any tile (or the caller) established one.
    pub origin: Option<DVec3>,
    pub stats: PipelineStats,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicUsize,
    reused: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct PipelineInner {
    client: Arc<dyn HttpClient>,
    cache: AssetCache,
    origin: OriginCoordinator,
    explicit_origin: bool,
    report: ReportWriter,
    counters: Counters,
    files: Mutex<Vec<String>>,
}

/// Processes collected leaf URLs into aligned tiles on disk.
pub struct DownloadPipeline {
    inner: Arc<PipelineInner>,
    parallel: usize,
}

impl DownloadPipeline {
    /// Creates a pipeline.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client for leaf assets
    /// * `cache` - Output directory store
    /// * `report` - Contract log writer
    /// * `origin` - Explicit shared origin, or `None` to adopt one
    /// * `parallel` - Concurrent workers in Phase B (at least 1)
    pub fn new(
        client: Arc<dyn HttpClient>,
        cache: AssetCache,
        report: ReportWriter,
        origin: Option<DVec3>,
        parallel: usize,
    ) -> Self {
        let coordinator = match origin {
            Some(origin) => OriginCoordinator::with_origin(origin),
            None => OriginCoordinator::new(),
        };

        Self {
            inner: Arc::new(PipelineInner {
                client,
                cache,
                origin: coordinator,
                explicit_origin: origin.is_some(),
                report,
                counters: Counters::default(),
                files: Mutex::new(Vec::new()),
            }),
            parallel: parallel.max(1),
        }
    }

    /// Processes every leaf. Individual failures never fail the run.
    pub async fn run(&self, leaves: Vec<Url>) -> PipelineOutcome {
        let inner = &self.inner;
        let mut remaining = leaves.into_iter();

        if inner.explicit_origin {
            if let Some(origin) = inner.origin.get() {
                info!(origin = ?origin, "Using explicit origin");
                inner.report.origin(origin);
            }
        } else {
            // Phase A: one leaf at a time until the origin is fixed
            for url in remaining.by_ref() {
                inner.process_and_record(&url).await;
                if inner.origin.is_set() {
                    break;
                }
            }
        }

        // Phase B
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut tasks = JoinSet::new();
        for url in remaining {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let inner = Arc::clone(inner);
            tasks.spawn(async move {
                let _permit = permit;
                inner.process_and_record(&url).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Tile worker aborted");
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let files = {
            let collected = std::mem::take(&mut *inner.files.lock());
            let mut seen = HashSet::new();
            collected
                .into_iter()
                .filter(|f| seen.insert(f.clone()))
                .collect::<Vec<_>>()
        };

        let stats = inner.counters.snapshot();
        info!(
            files = files.len(),
            fetched = stats.fetched,
            reused = stats.reused,
            failed = stats.failed,
            "Pipeline complete"
        );

        PipelineOutcome {
            files,
            origin: inner.origin.get(),
            stats,
        }
    }
}

impl PipelineInner {
    async fn process_and_record(&self, url: &Url) {
        match self.process(url).await {
            Ok(file) => self.files.lock().push(file),
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(url = %redacted(url), error = %e, "Tile failed; excluded from results");
            }
        }
    }

    /// Runs one leaf through fetch-or-load, align and persist.
    async fn process(&self, url: &Url) -> Result<String> {
        let identity = AssetCache::identity(url);
        let file = AssetCache::file_name(&identity);

        let asset = if self.cache.exists(&identity).await {
            debug!(file = %file, "Tile already stored; reusing");
            self.cache.load(&identity).await?
        } else {
            self.fetch(url).await?
        };

        let translation = match asset.original_position() {
            Some(original) => {
                let adoption = self.origin.adopt(original);
                if adoption.newly_set {
                    info!(origin = ?adoption.value, file = %file, "Origin established");
                    self.report.origin(adoption.value);
                }

                let alignment = FrameAligner::align(original, adoption.value);
                if asset.source() == AssetSource::Fetched {
                    let aligned = FrameAligner::apply(&asset, &alignment)
                        .map_err(|e| Error::decode(redacted(url), e))?;
                    self.cache.store(&identity, &aligned).await?;
                }
                alignment.translation()
            }
            None => {
                warn!(file = %file, "Tile has no translated node; stored unaligned");
                if asset.source() == AssetSource::Fetched {
                    self.cache.store(&identity, &asset).await?;
                }
                DVec3::ZERO
            }
        };

        match asset.source() {
            AssetSource::Fetched => {
                self.counters.fetched.fetch_add(1, Ordering::Relaxed);
                info!(file = %file, "Wrote new tile");
            }
            AssetSource::Cached => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.report.copyright(&file, asset.copyright());
        self.report.tile_translation(&file, translation);
        Ok(file)
    }

    async fn fetch(&self, url: &Url) -> Result<TileAsset> {
        let response = self.client.get(url).await?.ensure_success(url)?;
        let document =
            GlbDocument::parse(&response.body).map_err(|e| Error::decode(redacted(url), e))?;
        Ok(TileAsset::from_fetched(document))
    }
}
