use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::crawl::PageSource;
use crate::error::FetchError;

/// Plain HTTP page source backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpSource { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(transport)?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}

/// Outcome of probing one start URL.
#[derive(Debug)]
pub struct ProbeResult {
    pub url: String,
    pub error: Option<FetchError>,
}

impl ProbeResult {
    pub fn accessible(&self) -> bool {
        self.error.is_none()
    }
}

/// Request every URL once and report which are reachable, without raising.
pub async fn probe<S: PageSource>(source: &S, urls: &[String]) -> Vec<ProbeResult> {
    let mut results = Vec::with_capacity(urls.len());
    for url in urls {
        let error = source.fetch(url).await.err();
        results.push(ProbeResult {
            url: url.clone(),
            error,
        });
    }
    results
}
