//! HTTP binding for an upstream service.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::UpstreamConfig;
use crate::upstream::{CallError, Payload, Upstream};

/// An upstream reached with a plain `GET` against a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    name: String,
    url: Url,
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(name: impl Into<String>, url: Url, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            url,
            client,
        }
    }

    /// Build from configuration. The URL must already have passed validation.
    pub fn from_config(config: &UpstreamConfig, client: reqwest::Client) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.url)?;
        Ok(Self::new(config.name.clone(), url, client))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, timeout: Duration) -> Result<Payload, CallError> {
        let response = self
            .client
            .get(self.url.clone())
            .header("user-agent", "failover-dispatcher")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Timeout(timeout)
                } else {
                    CallError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(upstream = %self.name, status = %status, "Upstream returned non-success status");
            return Err(CallError::Status { status: status.as_u16() });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        Ok(Payload::new(body))
    }
}
