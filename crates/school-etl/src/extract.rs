//! Extractor stage
//!
//! Fetches one page of the school directory over HTTP and hands back the
//! decoded JSON untouched. Retries are not done here; the orchestrator owns
//! the retry policy.

use async_trait::async_trait;
use reqwest::{Client, Url};
use school_etl_common::{EtlError, Result};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::models::RawPage;

/// Anything that can produce a `RawPage`
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch the configured page
    async fn fetch(&self) -> Result<RawPage>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// HTTP extractor for the school directory API
pub struct HttpExtractor {
    client: Client,
    config: SourceConfig,
    url: Url,
}

impl HttpExtractor {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let url = Self::page_url(&config)?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| EtlError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            url,
        })
    }

    /// Request URL with `page` and `perPage` appended to any existing query
    pub fn page_url(config: &SourceConfig) -> Result<Url> {
        let mut url = Url::parse(&config.url)
            .map_err(|e| EtlError::Config(format!("Invalid source URL '{}': {}", config.url, e)))?;

        url.query_pairs_mut()
            .append_pair("page", &config.page.to_string())
            .append_pair("perPage", &config.page_size.to_string());

        Ok(url)
    }
}

#[async_trait]
impl Source for HttpExtractor {
    async fn fetch(&self) -> Result<RawPage> {
        info!(url = %self.url, "Fetching source page");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| EtlError::SourceUnavailable(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::SourceUnavailable(format!(
                "GET {} returned HTTP {}",
                self.url, status
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            EtlError::SourceUnavailable(format!("Reading body of {} failed: {}", self.url, e))
        })?;

        debug!(bytes = body.len(), "Received source page");

        let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            EtlError::SchemaMismatch(format!("Response body is not valid JSON: {}", e))
        })?;

        info!(
            bytes = body.len(),
            page = self.config.page,
            page_size = self.config.page_size,
            "Fetched source page"
        );

        Ok(RawPage::new(value))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
