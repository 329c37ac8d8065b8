//! Thumbnail download and disk cache for the picker grid.

use api_client::MediaItem;
use iced::widget::image::Handle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageLoaderError {
    #[error("image not found")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("semaphore closed")]
    SemaphoreClosed,
}

impl From<reqwest::Error> for ImageLoaderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ImageLoaderError::Timeout
        } else {
            ImageLoaderError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageLoader {
    cache_dir: PathBuf,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl ImageLoader {
    /// `max_concurrent` bounds parallel downloads and is at least one.
    pub fn new(cache_dir: PathBuf, max_concurrent: usize) -> Self {
        Self::with_client(cache_dir, reqwest::Client::new()).with_concurrency(max_concurrent)
    }

    pub fn with_client(cache_dir: PathBuf, client: reqwest::Client) -> Self {
        Self {
            cache_dir,
            client,
            semaphore: Arc::new(Semaphore::new(4)),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub fn thumbnail_path(&self, media_id: &str) -> PathBuf {
        self.cache_dir.join("thumbnails").join(format!("{}.jpg", media_id))
    }

    /// Handle for a thumbnail already on disk.
    pub fn cached_thumbnail(&self, media_id: &str) -> Option<Handle> {
        let path = self.thumbnail_path(media_id);
        path.exists().then(|| Handle::from_path(path))
    }

    pub async fn load_thumbnail(&self, item: &MediaItem) -> Result<Handle, ImageLoaderError> {
        if let Some(handle) = self.cached_thumbnail(&item.id) {
            return Ok(handle);
        }

        let start = Instant::now();
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ImageLoaderError::SemaphoreClosed)?;

        let url = item.preview_url().ok_or(ImageLoaderError::NotFound)?;
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ImageLoaderError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ImageLoaderError::Network(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await?;

        let cache_path = self.thumbnail_path(&item.id);
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ImageLoaderError::Io(e.to_string()))?;
        }
        fs::write(&cache_path, &bytes)
            .await
            .map_err(|e| ImageLoaderError::Io(e.to_string()))?;

        tracing::debug!("thumbnail_time_ms" = %start.elapsed().as_millis(), "id" = %item.id);
        Ok(Handle::from_path(&cache_path))
    }
}
