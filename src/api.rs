// src/api.rs - Panel backend REST API

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::DashboardData;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure or timeout; the backend never answered.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-success status.
    #[error("backend rejected request ({status}){}", detail_suffix(.detail))]
    Rejected { status: u16, detail: Option<String> },

    /// A success response whose body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
}

impl ApiError {
    /// Server-provided explanation, if the backend sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PanelApi: Send + Sync {
    /// Fetch consolidated inbound, log and system state
    async fn fetch_state(&self) -> Result<DashboardData, ApiError>;

    /// Ask the backend to create an inbound listener
    async fn create_inbound(&self, port: &str, path: &str) -> Result<(), ApiError>;

    /// Ask the backend to remove the inbound listening on `port`
    async fn delete_inbound(&self, port: u16) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// [`PanelApi`] over HTTP.
pub struct HttpPanelApi {
    base: String,
    client: reqwest::Client,
}

impl HttpPanelApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xcore-panel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(base, client))
    }

    pub fn with_client(base: &str, client: reqwest::Client) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The body is best effort: only a JSON `{"detail": "..."}` is meaningful.
        let detail = match response.text().await {
            Ok(text) => serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.detail)
                .filter(|detail| !detail.is_empty()),
            Err(_) => None,
        };

        Err(ApiError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    ApiError::Unreachable(e.to_string())
}

#[async_trait]
impl PanelApi for HttpPanelApi {
    async fn fetch_state(&self) -> Result<DashboardData, ApiError> {
        let url = self.url("/api/data");
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await.map_err(transport_error)?;

        serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn create_inbound(&self, port: &str, path: &str) -> Result<(), ApiError> {
        let url = self.url("/api/inbound");
        debug!("POST {} port={} path={}", url, port, path);

        let response = self
            .client
            .post(&url)
            .form(&[("port", port), ("path", path)])
            .send()
            .await
            .map_err(transport_error)?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn delete_inbound(&self, port: u16) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/inbound/{}", port));
        debug!("DELETE {}", url);

        let response = self.client.delete(&url).send().await.map_err(transport_error)?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
