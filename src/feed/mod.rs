//! Supply feed: where the delimited card table comes from and how it is read.
//!
//! `FeedSource` abstracts the transport so the builder can be driven by
//! an in-memory feed in tests; `HttpFeed` is the production fetcher.

pub mod parser;

pub use parser::FeedParser;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::types::SupplyError;

/// Abstraction over the raw supply feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the raw feed text. Any transport failure or non-2xx
    /// status is a `SupplyError::Fetch`.
    async fn fetch(&self) -> Result<String, SupplyError>;

    /// Where the feed comes from, for logging.
    fn location(&self) -> &str;
}

/// Fetches the feed over HTTP from a fixed URL.
pub struct HttpFeed {
    http: Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, SupplyError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| SupplyError::Config(format!("Failed to build feed HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    fn fetch_error(&self, message: impl Into<String>) -> SupplyError {
        SupplyError::Fetch {
            url: self.url.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<String, SupplyError> {
        info!(url = %self.url, "Fetching supply feed");

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.fetch_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.fetch_error(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.fetch_error(format!("unreadable body: {e}")))?;

        debug!(bytes = body.len(), "Supply feed downloaded");
        Ok(body)
    }

    fn location(&self) -> &str {
        &self.url
    }
}
