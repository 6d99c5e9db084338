//! AI Service Probe
//!
//! A single bounded request against the AI provider. The monitor only
//! cares whether it succeeded; the error says why it did not.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a probe was unhealthy
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Unhealthy status: HTTP {0}")]
    Status(u16),
    #[error("Probe request failed: {0}")]
    Request(reqwest::Error),
}

/// Health probe against the external AI service
#[async_trait]
pub trait AiProbe: Send + Sync {
    /// Ok when the service answered healthy
    async fn probe(&self) -> Result<(), ProbeError>;
}

/// Probes `GET {api_base}/models` with a bearer credential
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe whose requests are bounded by `timeout`
    pub fn new(api_base: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProbeError::Request)?;

        Ok(Self {
            client,
            url: format!("{}/models", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Probe target URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if e.is_connect() {
            ProbeError::Connect(e.to_string())
        } else {
            ProbeError::Request(e)
        }
    }
}

#[async_trait]
impl AiProbe for HttpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "AI service probe passed");
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}
