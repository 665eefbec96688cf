//! HTTP/JSON transport to the simulation engine backend.
//!
//! * `POST <base>/run` with a JSON [`RunRequest`] → JSON [`RunResponse`]
//! * `GET <base><timeseries_url>` → CSV text
//!
//! Non-success statuses are turned into [`EngineError::Status`] carrying the
//! body text, so the user sees exactly what the backend reported.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{EngineError, RunRequest, RunResponse, SimulationEngine};

/// Default engine address when nothing else is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// [`SimulationEngine`] backed by the engine's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEngine {
    /// Creates an engine client for `base_url`.
    ///
    /// `timeout` bounds each whole request, including the submission round
    /// trip, which lasts as long as the simulation itself.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    /// Engine base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a URL returned by the engine.  Absolute URLs are used as-is;
    /// anything else is taken relative to the base URL.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }
}

#[async_trait]
impl SimulationEngine for HttpEngine {
    async fn submit(&self, request: &RunRequest) -> Result<RunResponse, EngineError> {
        let url = format!("{}/run", self.base_url);
        info!(
            url = %url,
            options = request.config_options.len(),
            seed = ?request.seed,
            "submitting run"
        );

        let resp = self.client.post(&url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "engine rejected run");
            return Err(EngineError::rejected(status.as_u16(), &body));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }

    async fn fetch_timeseries(&self, timeseries_url: &str) -> Result<String, EngineError> {
        let url = self.resolve(timeseries_url);
        debug!(url = %url, "fetching timeseries");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %url, "timeseries fetch failed");
            return Err(EngineError::timeseries_unavailable(status.as_u16()));
        }

        Ok(resp.text().await?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
