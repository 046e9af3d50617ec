//! Recursive tileset traversal with bounded nested fetches.
//!
//! ```text
//!                    root.json (fetched up front; failure is fatal)
//!                        │
//!            ┌───────────┼─────────────┐
//!        culled      has children     childless + content
//!        (stop)      (descend all,        │
//!                     ignore own      ┌───┴──────────┐
//!                     content)      *.glb          other URI
//!                                  (leaf)      (nested fetch task)
//!                                                   │
//!                                    Semaphore(traversal_concurrency)
//!                                                   │
//!                                   JSON ──► walk fetched root
//!                                   other ──► leaf
//!                                   error ──► warn, zero leaves
//! ```
//!
//! Descent itself is synchronous; only nested document fetches suspend.
//! Every nested fetch runs as a task on a [`TaskTracker`], so the traversal
//! is complete once the initial descent returns and the tracker drains.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::query::{authorize, is_mesh_url, redacted, SessionToken};
use super::types::{TileNode, TilesetDocument};
use crate::culling::{node_intersects, BoundingSphere};
use crate::error::Result;
use crate::provider::{BoxFuture, HttpClient};

/// Counters describing one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Nodes whose bounding sphere missed the region.
    pub culled: usize,
    /// Nested tileset documents fetched and walked.
    pub nested_fetched: usize,
    /// Nested fetches that contributed nothing because they failed.
    pub nested_failed: usize,
}

/// Result of a traversal.
#[derive(Debug, Clone)]
pub struct Traversal {
    /// Leaf asset URLs, credentials included, without duplicates.
    pub leaves: Vec<Url>,
    pub stats: TraversalStats,
}

/// State shared by the descent and every nested fetch task.
struct WalkContext {
    client: Arc<dyn HttpClient>,
    api_key: String,
    region: BoundingSphere,
    fetch_limit: Semaphore,
    tracker: TaskTracker,
    leaves: Mutex<Vec<Url>>,
    culled: AtomicUsize,
    nested_fetched: AtomicUsize,
    nested_failed: AtomicUsize,
}

/// Collects the leaf mesh URLs of a tileset that intersect a region.
pub struct TileTreeWalker {
    ctx: Arc<WalkContext>,
}

impl TileTreeWalker {
    /// Creates a walker.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client for tileset documents
    /// * `api_key` - Credential added to every URL lacking one
    /// * `region` - Region of interest
    /// * `concurrency` - Maximum nested tileset fetches in flight (at least 1)
    pub fn new(
        client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        region: BoundingSphere,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(WalkContext {
                client,
                api_key: api_key.into(),
                region,
                fetch_limit: Semaphore::new(concurrency.max(1)),
                tracker: TaskTracker::new(),
                leaves: Mutex::new(Vec::new()),
                culled: AtomicUsize::new(0),
                nested_fetched: AtomicUsize::new(0),
                nested_failed: AtomicUsize::new(0),
            }),
        }
    }

    /// Fetches the root document and walks the whole tree.
    ///
    /// Must be called from within a Tokio runtime. A walker is meant for a
    /// single traversal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) or
    /// [`Error::Parse`](crate::Error::Parse) if the root document cannot be
    /// fetched or parsed. Failures below the root are logged and skipped.
    pub async fn collect(&self, root_url: &Url) -> Result<Traversal> {
        let ctx = &self.ctx;

        let mut session = SessionToken::new();
        let mut url = root_url.clone();
        session.observe(&url);
        authorize(&mut url, &ctx.api_key, &session);

        info!(url = %redacted(&url), "Fetching root tileset");
        let response = ctx.client.get(&url).await?.ensure_success(&url)?;
        let root = TilesetDocument::parse_root(&response.body, &redacted(&url))?;

        walk_node(ctx, &root, &url, &mut session);

        ctx.tracker.close();
        ctx.tracker.wait().await;

        let leaves = {
            let collected = std::mem::take(&mut *ctx.leaves.lock());
            let mut seen = HashSet::new();
            collected
                .into_iter()
                .filter(|u| seen.insert(u.as_str().to_string()))
                .collect::<Vec<_>>()
        };

        let stats = TraversalStats {
            culled: ctx.culled.load(Ordering::Relaxed),
            nested_fetched: ctx.nested_fetched.load(Ordering::Relaxed),
            nested_failed: ctx.nested_failed.load(Ordering::Relaxed),
        };

        info!(
            leaves = leaves.len(),
            nested_fetched = stats.nested_fetched,
            nested_failed = stats.nested_failed,
            culled = stats.culled,
            "Traversal complete"
        );

        Ok(Traversal { leaves, stats })
    }
}

/// Descends one node. `session` is the token of the current branch; it is
/// updated in place so later siblings inherit what earlier ones observed.
fn walk_node(ctx: &Arc<WalkContext>, node: &TileNode, base: &Url, session: &mut SessionToken) {
    if !node_intersects(node.oriented_box().as_ref(), &ctx.region) {
        ctx.culled.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if !node.is_leaf() {
        for child in &node.children {
            walk_node(ctx, child, base, session);
        }
        return;
    }

    let Some(uri) = node.content_uri() else {
        return;
    };

    let mut url = match base.join(uri) {
        Ok(url) => url,
        Err(e) => {
            warn!(uri, error = %e, "Skipping unresolvable content URI");
            return;
        }
    };

    session.observe(&url);
    authorize(&mut url, &ctx.api_key, session);

    if is_mesh_url(&url) {
        debug!(url = %redacted(&url), "Found leaf tile");
        ctx.leaves.lock().push(url);
    } else {
        let task = fetch_nested(Arc::clone(ctx), url, session.clone());
        ctx.tracker.spawn(task);
    }
}

/// Fetches a nested tileset document and continues the descent at its root.
fn fetch_nested(ctx: Arc<WalkContext>, url: Url, session: SessionToken) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let response = {
            let Ok(_permit) = ctx.fetch_limit.acquire().await else {
                return;
            };
            ctx.client.get(&url).await
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Could not fetch nested tileset");
                ctx.nested_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if !response.is_ok() {
            warn!(status = response.status, url = %redacted(&url), "Nested tileset request failed");
            ctx.nested_failed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Servers may answer mesh content on paths that do not end in .glb
        if !response.is_json() {
            debug!(url = %redacted(&url), "Non-JSON nested response recorded as leaf");
            ctx.leaves.lock().push(url);
            return;
        }

        let root = match TilesetDocument::parse_root(&response.body, &redacted(&url)) {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, "Skipping malformed nested tileset");
                ctx.nested_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        ctx.nested_fetched.fetch_add(1, Ordering::Relaxed);
        let mut session = session;
        walk_node(&ctx, &root, &url, &mut session);
    })
}
