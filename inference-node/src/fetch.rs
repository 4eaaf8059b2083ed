use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::FetchConfig;
use crate::error::{PipelineError, Result};

/// Where sample photos come from. Any failure here is a classification failure.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Downloads images over HTTP(S). One attempt, bounded by the configured timeout.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_image_bytes,
        })
    }
}

impl HttpImageFetcher {
    fn too_large(&self, size: u64) -> PipelineError {
        PipelineError::ClassificationFailed(format!(
            "image exceeds {} bytes (got at least {})",
            self.max_bytes, size
        ))
    }
}

#[async_trait]
impl ImageSource for HttpImageFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let mut response = self.client.get(location).send().await?.error_for_status()?;

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes as u64 {
                return Err(self.too_large(declared));
            }
        }

        // Content-Length may be absent or wrong, so the limit also applies while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large((bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// Reads images from the local filesystem; `file://` prefixes are accepted.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    root: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative locations resolve against `root`.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
        let path = match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        };

        tokio::fs::read(&path).await.map_err(|e| {
            PipelineError::ClassificationFailed(format!("cannot read {}: {}", path.display(), e))
        })
    }
}

/// HTTP for http(s) locations, the filesystem for everything else.
pub struct AnyImageSource {
    http: HttpImageFetcher,
    files: FileImageSource,
}

impl AnyImageSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            http: HttpImageFetcher::new(config)?,
            files: FileImageSource::new(),
        })
    }
}

#[async_trait]
impl ImageSource for AnyImageSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            self.http.fetch(location).await
        } else {
            self.files.fetch(location).await
        }
    }
}
