//! HTTP client for the storage network's file status endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::{AppError, ExternalServiceError, FileMeta, FileStatus, FileStatusService};

/// Configuration for the status service client
#[derive(Debug, Clone)]
pub struct StatusClientConfig {
    pub request_timeout: Duration,
}

impl Default for StatusClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// `GET <base_url>/<content_hash>` against the storage network.
pub struct HttpStatusService {
    http_client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    ok: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    state: String,
    #[serde(default)]
    size: Option<u64>,
}

impl HttpStatusService {
    pub fn new(base_url: &str, config: StatusClientConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExternalServiceError::HttpError(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_defaults(base_url: &str) -> Result<Self, AppError> {
        Self::new(base_url, StatusClientConfig::default())
    }

    fn url_for(&self, content_hash: &str) -> String {
        format!("{}/{}", self.base_url, content_hash)
    }
}

#[async_trait]
impl FileStatusService for HttpStatusService {
    #[instrument(skip(self))]
    async fn file_status(&self, content_hash: &str) -> Result<FileMeta, AppError> {
        let response = self
            .http_client
            .get(self.url_for(content_hash))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExternalServiceError::Timeout(e.to_string())
                } else {
                    ExternalServiceError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalServiceError::Unavailable(format!(
                "status service answered {}",
                status
            ))
            .into());
        }

        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| ExternalServiceError::MalformedResponse(e.to_string()))?;
        let body = envelope.ok.ok_or_else(|| {
            ExternalServiceError::MalformedResponse("response has no 'ok' object".to_string())
        })?;
        let state: FileStatus = body.state.parse().map_err(|_| {
            ExternalServiceError::MalformedResponse(format!("unknown file state '{}'", body.state))
        })?;

        debug!(state = %state, "File status received");
        Ok(FileMeta {
            state,
            size: body.size,
        })
    }
}
