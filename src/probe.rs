//! HTTP health probe.
//!
//! # Responsibilities
//! - Issue a GET against the backend endpoint
//! - Tag every attempt with a fresh `x-request-id`
//! - Turn transport errors and non-2xx statuses into failures

use std::time::Duration;

use reqwest::StatusCode;

use crate::config::ProbeConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, config.request_timeout())
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET. Returns the status on 2xx.
    pub async fn check(&self) -> Result<StatusCode, ProbeError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(url = %self.url, request_id = %request_id, "Probing");

        let response = self
            .client
            .get(&self.url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .map_err(|source| ProbeError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(ProbeError::Status {
                url: self.url.clone(),
                status,
            })
        }
    }
}
