//! Wrapped-balance lookups.
//!
//! For each card, the number of wrapped tokens held at a custodial
//! address is scraped from a block-explorer token page. Scraping is
//! unreliable by nature, so the `BalanceLookup` capability never fails:
//! every problem degrades to a balance of 0 with a logged reason.
//!
//! Lookups are paced through a process-wide [`RateGate`] so consecutive
//! requests are at least `min_delay` apart, no matter how many refreshes
//! are asking.

pub mod scrape;

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BalanceTargets;
use crate::types::{ItemId, SupplyError};

/// Abstraction over "how many wrapped tokens does the custodian hold".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceLookup: Send + Sync {
    /// Balance for `id`; 0 on any failure.
    async fn lookup(&self, id: &ItemId) -> u64;
}

// ---------------------------------------------------------------------------
// Rate gate
// ---------------------------------------------------------------------------

/// Serializes calls and keeps at least `min_interval` between the end of
/// one call and the start of the next. A call that is dropped mid-flight
/// still counts from its start.
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Run `call` once the gate is free and the interval has elapsed.
    pub async fn run<F: Future>(&self, call: F) -> F::Output {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.min_interval).await;
        }
        // A cancelled call may already have reached upstream.
        *last = Some(Instant::now());
        let out = call.await;
        *last = Some(Instant::now());
        out
    }
}

// ---------------------------------------------------------------------------
// Scraping lookup
// ---------------------------------------------------------------------------

/// Production lookup: fetches the explorer page and scrapes the balance.
pub struct ScrapedBalanceLookup {
    http: Client,
    targets: BalanceTargets,
    gate: RateGate,
}

impl ScrapedBalanceLookup {
    /// `timeout` bounds each page request; `min_delay` spaces them out.
    pub fn new(
        targets: BalanceTargets,
        timeout: Duration,
        min_delay: Duration,
        user_agent: &str,
    ) -> Result<Self, SupplyError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SupplyError::Config(format!("Failed to build balance HTTP client: {e}")))?;
        Ok(Self {
            http,
            targets,
            gate: RateGate::new(min_delay),
        })
    }

    async fn fetch_balance(&self, id: &ItemId, url: &str) -> Result<u64, SupplyError> {
        let lookup_error = |message: String| SupplyError::Lookup { item: *id, message };

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(lookup_error(format!("HTTP {status}")));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| lookup_error(format!("unreadable body: {e}")))?;

        scrape::extract_balance(&html)
            .ok_or_else(|| lookup_error("no balance figure on page".to_string()))
    }
}

#[async_trait]
impl BalanceLookup for ScrapedBalanceLookup {
    async fn lookup(&self, id: &ItemId) -> u64 {
        let Some(url) = self.targets.page_url(id) else {
            debug!(card = %id, "No wrapped contract mapped, balance is 0");
            return 0;
        };

        debug!(card = %id, url = %url, "Fetching wrapped balance");
        match self.gate.run(self.fetch_balance(id, &url)).await {
            Ok(balance) => {
                info!(card = %id, balance, "Wrapped balance found");
                balance
            }
            Err(e) => {
                warn!(card = %id, error = %e, "Wrapped balance lookup failed, using 0");
                0
            }
        }
    }
}
