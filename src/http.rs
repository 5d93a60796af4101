//! Blocking HTTP fetcher for rendered diagrams.

use crate::config::HttpConfig;
use crate::pipeline::{FetchError, ImageFetcher};
use std::time::Duration;
use ureq::Agent;

/// Create an HTTP agent honoring the configured timeout.
pub fn agent(config: &HttpConfig) -> Agent {
    Agent::config_builder()
        .timeout_global(config.timeout_secs.map(Duration::from_secs))
        .build()
        .into()
}

#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            agent: agent(config),
        }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.agent.get(url).call().map_err(|err| match err {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            other => FetchError::Transport(other.to_string()),
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status(status));
        }

        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        tracing::debug!(url, bytes = bytes.len(), "fetched diagram");
        Ok(bytes)
    }
}
