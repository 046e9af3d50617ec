//! Local tile store keyed by tile identity.
//!
//! Each unique tile lands in exactly one file under the output directory:
//!
//! ```text
//! https://host/v1/.../x.glb?key=K&session=S
//!        │
//!        ▼ identity: strip key/session
//! /v1/.../x.glb
//!        │
//!        ▼ SHA-1, lowercase hex
//! <out>/3f786850e387550fdab836ed7e6dc881de23001b.glb
//! ```
//!
//! A file that exists is never fetched again. Writes go to a temporary file
//! in the same directory and are renamed into place, so an interrupted run
//! never leaves a truncated tile behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec3;
use reqwest::Url;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::asset::{TileAsset, ORIGINAL_TRANSLATION_KEY};
use crate::error::{Error, Result};
use crate::glb::GlbDocument;
use crate::tileset::TileIdentity;

/// File extension of persisted tiles.
pub const TILE_EXTENSION: &str = "glb";

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Directory-backed store of aligned tiles.
#[derive(Debug, Clone)]
pub struct AssetCache {
    dir: PathBuf,
}

impl AssetCache {
    /// Creates a cache rooted at `dir`. The directory is not touched until
    /// [`prepare`](Self::prepare) or [`store`](Self::store) is called.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the output directory if it does not exist.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::asset_io(&self.dir, e))
    }

    /// Returns the identity of a tile URL.
    pub fn identity(url: &Url) -> TileIdentity {
        TileIdentity::from_url(url)
    }

    /// Returns the deterministic file name for an identity.
    pub fn file_name(identity: &TileIdentity) -> String {
        let digest = Sha1::digest(identity.as_str().as_bytes());
        format!("{:x}.{}", digest, TILE_EXTENSION)
    }

    /// Returns the full path for an identity.
    pub fn path(&self, identity: &TileIdentity) -> PathBuf {
        self.dir.join(Self::file_name(identity))
    }

    /// Returns true if a tile for this identity is already stored.
    pub async fn exists(&self, identity: &TileIdentity) -> bool {
        tokio::fs::try_exists(self.path(identity))
            .await
            .unwrap_or(false)
    }

    /// Loads a stored tile and recovers its original position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetIo`] if the file cannot be read or is not a
    /// valid GLB container.
    pub async fn load(&self, identity: &TileIdentity) -> Result<TileAsset> {
        let path = self.path(identity);

        let read_path = path.clone();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(&read_path))
            .await
            .map_err(|e| Error::asset_io(&path, e))?
            .map_err(|e| Error::asset_io(&path, e))?;

        let document = GlbDocument::parse(&bytes).map_err(|e| Error::asset_io(&path, e))?;
        let original_position = Self::recover_original_position(&document);

        debug!(path = %path.display(), "Loaded cached tile");
        Ok(TileAsset::from_cached(document, original_position))
    }

    /// Recovers a stored tile's original position.
    ///
    /// Reads `extras.originalTranslation`. Files written without it fall
    /// back to the first translated node's current translation, which is
    /// only correct if the file was never aligned.
    pub fn recover_original_position(document: &GlbDocument) -> Option<DVec3> {
        if let Some(position) = document.extras_vec3(ORIGINAL_TRANSLATION_KEY) {
            return Some(position);
        }

        let fallback = document
            .translated_nodes()
            .first()
            .and_then(|&node| document.node_translation(node));
        if fallback.is_some() {
            warn!("Cached tile has no recorded original position; using node translation");
        }
        fallback
    }

    /// Persists a tile atomically and returns the written path.
    ///
    /// The tile's original position is (re)recorded in the document extras.
    pub async fn store(&self, identity: &TileIdentity, asset: &TileAsset) -> Result<PathBuf> {
        let path = self.path(identity);

        let mut document = asset.document().clone();
        if let Some(position) = asset.original_position() {
            document.set_extras_vec3(ORIGINAL_TRANSLATION_KEY, position);
        }
        let bytes = document
            .to_bytes()
            .map_err(|e| Error::asset_io(&path, e))?;

        let temp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            Self::file_name(identity),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));

        let final_path = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&temp_path, &bytes)?;
            if let Err(e) = std::fs::rename(&temp_path, &final_path) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(e);
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::asset_io(&path, e))?
        .map_err(|e| Error::asset_io(&path, e))?;

        debug!(path = %path.display(), "Stored tile");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetSource;
    use crate::glb::tests::triangle_document;
    use tempfile::TempDir;

    fn identity(s: &str) -> TileIdentity {
        AssetCache::identity(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_file_name_is_sha1_of_identity() {
        let id = identity("https://tile.example/abc?key=K&session=S");
        assert_eq!(id.as_str(), "/abc");
        // sha1("/abc")
        let expected = format!("{:x}.glb", Sha1::digest(b"/abc"));
        assert_eq!(AssetCache::file_name(&id), expected);
        assert_eq!(AssetCache::file_name(&id).len(), 40 + 4);
    }

    #[test]
    fn test_file_name_stable_across_sessions() {
        let a = identity("https://tile.example/f/x.glb?key=A&session=1");
        let b = identity("https://tile.example/f/x.glb?session=2&key=B");
        assert_eq!(AssetCache::file_name(&a), AssetCache::file_name(&b));
    }

    #[tokio::test]
    async fn test_store_then_load_preserves_original_position() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path());
        let id = identity("https://tile.example/f/x.glb");

        assert!(!cache.exists(&id).await);

        // Aligned document: node translation no longer equals the original
        let fetched = TileAsset::from_fetched(triangle_document(Some([7.0, 8.0, 9.0])));
        let aligned = fetched.derive(triangle_document(Some([0.0, 0.0, 0.0])));
        let path = cache.store(&id, &aligned).await.unwrap();

        assert!(path.exists());
        assert!(cache.exists(&id).await);

        let loaded = cache.load(&id).await.unwrap();
        assert_eq!(loaded.source(), AssetSource::Cached);
        assert_eq!(loaded.original_position(), Some(DVec3::new(7.0, 8.0, 9.0)));
        assert_eq!(loaded.document().node_translation(0), Some(DVec3::ZERO));
    }

    #[tokio::test]
    async fn test_store_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path());
        let id = identity("https://tile.example/f/y.glb");
        let asset = TileAsset::from_fetched(triangle_document(Some([1.0, 1.0, 1.0])));

        cache.store(&id, &asset).await.unwrap();
        cache.store(&id, &asset).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![AssetCache::file_name(&id)]);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_asset_io_error() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path());
        let id = identity("https://tile.example/f/bad.glb");
        std::fs::write(cache.path(&id), b"definitely not a glb").unwrap();

        let result = cache.load(&id).await;
        assert!(matches!(result, Err(Error::AssetIo { .. })));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_asset_io_error() {
        let temp = TempDir::new().unwrap();
        let cache = AssetCache::new(temp.path());
        let result = cache.load(&identity("https://tile.example/none.glb")).await;
        assert!(matches!(result, Err(Error::AssetIo { .. })));
    }

    #[test]
    fn test_recover_falls_back_to_node_translation() {
        let doc = triangle_document(Some([4.0, 5.0, 6.0]));
        assert!(doc.extras_vec3(ORIGINAL_TRANSLATION_KEY).is_none());
        assert_eq!(
            AssetCache::recover_original_position(&doc),
            Some(DVec3::new(4.0, 5.0, 6.0))
        );
    }

    #[test]
    fn test_recover_without_any_position() {
        let doc = triangle_document(None);
        assert_eq!(AssetCache::recover_original_position(&doc), None);
    }
}
