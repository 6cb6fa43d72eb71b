//! Object storage for panel images, the audio track and the result manifest.
//!
//! Every upload goes through the shared [`RetryPolicy`]; running out of
//! attempts is fatal to the job ([`StoryError::UploadFailed`]).

use crate::error::{ProviderError, StoryError};
use crate::retry::{RetryError, RetryPolicy};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// `upload(bytes, path, content_type) → public URL`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        content_type: &str,
    ) -> Result<String, ProviderError>;
}

/// One object to upload.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Upload with retries. Exhaustion maps to [`StoryError::UploadFailed`].
pub async fn upload_with_retry(
    store: &dyn ObjectStore,
    policy: &RetryPolicy,
    bytes: &[u8],
    path: &str,
    content_type: &str,
) -> Result<String, StoryError> {
    let label = format!("Upload {path}");
    policy
        .run(&label, |_| store.upload(bytes, path, content_type))
        .await
        .map_err(|e| {
            let attempts = e.attempts();
            let detail = match e {
                RetryError::Exhausted { last, .. } => last.to_string(),
                RetryError::Corrupt { .. } => "rejected result".to_string(),
            };
            StoryError::UploadFailed {
                path: path.to_string(),
                attempts,
                detail,
            }
        })
}

/// Upload `items` with at most `concurrency` in flight.
///
/// URLs come back in item order. The first exhausted upload aborts the batch.
pub async fn upload_all(
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    items: Vec<UploadItem>,
    concurrency: usize,
) -> Result<Vec<String>, StoryError> {
    let total = items.len();
    let mut slots: Vec<Option<String>> = vec![None; total];

    let mut uploads = stream::iter(items.into_iter().enumerate())
        .map(|(i, item)| {
            let store = Arc::clone(&store);
            async move {
                let url = upload_with_retry(
                    store.as_ref(),
                    &policy,
                    &item.bytes,
                    &item.path,
                    item.content_type,
                )
                .await?;
                Ok::<_, StoryError>((i, url))
            }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some(result) = uploads.next().await {
        let (i, url) = result?;
        slots[i] = Some(url);
    }

    info!("Uploaded {} objects", total);
    slots
        .into_iter()
        .enumerate()
        .map(|(i, url)| url.ok_or_else(|| StoryError::Internal(format!("upload {i} missing"))))
        .collect()
}

// ── Supabase ─────────────────────────────────────────────────────────────

/// Supabase Storage REST API, upserting into one public bucket.
#[derive(Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    url: String,
    key: String,
    bucket: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// `SUPABASE_BUCKET`, then `SUPABASE_BUCKET_NAME`, then the default bucket.
fn bucket_from(var: impl Fn(&str) -> Option<String>) -> String {
    var("SUPABASE_BUCKET")
        .or_else(|| var("SUPABASE_BUCKET_NAME"))
        .unwrap_or_else(|| SupabaseStore::DEFAULT_BUCKET.to_string())
}

impl SupabaseStore {
    pub const DEFAULT_BUCKET: &'static str = "comic-results";

    pub fn new(url: impl Into<String>, key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            bucket: bucket.into(),
        }
    }

    /// Build from `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY` and optionally
    /// `SUPABASE_BUCKET` (or `SUPABASE_BUCKET_NAME`).
    pub fn from_env() -> Result<Self, StoryError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let (url, key) = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(key)) => (url, key),
            _ => {
                return Err(StoryError::ProviderNotConfigured {
                    provider: "supabase".into(),
                    hint: "Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY, or use --out-dir."
                        .into(),
                })
            }
        };
        Ok(Self::new(url, key, bucket_from(var)))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, self.bucket, path)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        content_type: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.object_url(path))
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        debug!("Uploaded {} ({} bytes)", path, bytes.len());
        Ok(self.public_url(path))
    }
}

// ── Local directory ──────────────────────────────────────────────────────

/// Writes objects under a directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, path: &str) -> Result<PathBuf, ProviderError> {
        let rel = Path::new(path);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ProviderError::InvalidResponse(format!(
                "refusing to write outside the store: {path}"
            )));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        _content_type: &str,
    ) -> Result<String, ProviderError> {
        let target = self.target(path)?;
        let io = |e: std::io::Error| ProviderError::Request(format!("{}: {e}", target.display()));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        tokio::fs::write(&target, bytes).await.map_err(io)?;
        let absolute = std::path::absolute(&target).map_err(io)?;
        Ok(format!("file://{}", absolute.display()))
    }
}
