//! Content-addressed cache for synthesised clips.
//!
//! Keys are the SHA-256 of the normalised narration text, so the same line
//! spoken twice (or re-run tomorrow) costs one backend call. The cache is a
//! best-effort optimisation: read and write failures are logged and treated
//! as misses.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Collapse whitespace and lowercase: the canonical form that is hashed
/// into a cache key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex of the normalised text.
pub fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Storage for encoded clips, keyed by [`cache_key`].
#[async_trait]
pub trait ClipCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, bytes: &[u8]);
    async fn evict(&self, key: &str);
}

/// Caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl ClipCache for NoCache {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn put(&self, _key: &str, _bytes: &[u8]) {}

    async fn evict(&self, _key: &str) {}
}

/// In-process cache; lives as long as the pipeline.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    hits: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ClipCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let hit = self.entries.read().await.get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    async fn put(&self, key: &str, bytes: &[u8]) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
    }

    async fn evict(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// One `{key}.wav` file per clip in a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{cache_dir}/pdf2story/tts`, or `None` when the platform has no
    /// cache directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("pdf2story").join("tts"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.wav"))
    }
}

#[async_trait]
impl ClipCache for DiskCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => {
                debug!("Clip cache hit: {}", key);
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Clip cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Clip cache dir {} unavailable: {}", self.dir.display(), e);
            return;
        }
        // Write-then-rename so a crash never leaves a truncated entry.
        let path = self.path_for(key);
        let tmp = path.with_extension("wav.tmp");
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Clip cache write failed for {}: {}", key, e);
        }
    }

    async fn evict(&self, key: &str) {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => debug!("Evicted corrupt clip {}", key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Clip cache evict failed for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_case_and_spacing() {
        assert_eq!(cache_key("Hello   World"), cache_key("hello world\n"));
        assert_ne!(cache_key("hello world"), cache_key("hello, world"));
        assert_eq!(cache_key("x").len(), 64);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  A\tB \n C "), "a b c");
    }

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let c = MemoryCache::new();
        assert!(c.get("k").await.is_none());
        c.put("k", b"abc").await;
        assert_eq!(c.get("k").await.as_deref(), Some(&b"abc"[..]));
        assert_eq!(c.hits(), 1);
        c.evict("k").await;
        assert!(c.is_empty().await);
    }

    #[tokio::test]
    async fn disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let c = DiskCache::new(dir.path().join("nested"));
        assert!(c.get("k").await.is_none());
        c.put("k", b"RIFF....").await;
        assert_eq!(c.get("k").await.as_deref(), Some(&b"RIFF...."[..]));
        c.evict("k").await;
        assert!(c.get("k").await.is_none());
        // Evicting twice is fine.
        c.evict("k").await;
    }
}
