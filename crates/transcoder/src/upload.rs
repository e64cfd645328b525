//! Upload collaborator.
//!
//! The finished container is handed to an [`UploadService`] after the run has
//! already reported `done`. Its outcome is reported as a notification only.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upload rejected: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// One finished file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Bytes,
}

#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<(), UploadError>;
}

/// Multipart upload endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpUploadConfig {
    pub url: String,
    /// Form field carrying the file.
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_field_name() -> String {
    "video".to_string()
}

fn default_timeout() -> u64 {
    300
}

impl HttpUploadConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            field_name: default_field_name(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Posts the file as a `multipart/form-data` request.
pub struct HttpUploadService {
    config: HttpUploadConfig,
    client: Client,
}

impl HttpUploadService {
    pub fn new(config: HttpUploadConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    pub fn config(&self) -> &HttpUploadConfig {
        &self.config
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn upload(&self, request: UploadRequest) -> Result<(), UploadError> {
        let size = request.content.len() as u64;
        let part = Part::stream_with_length(Body::from(request.content), size)
            .file_name(request.filename.clone())
            .mime_str("video/webm")?;
        let form = Form::new().part(self.config.field_name.clone(), part);

        let response = self
            .client
            .post(&self.config.url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Upload failed: {} - {}", status, body);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(filename = %request.filename, size, "Upload finished");
        Ok(())
    }
}
