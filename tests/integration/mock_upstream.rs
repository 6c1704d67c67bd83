//! In-memory upstreams for integration testing.
//!
//! A deterministic feed that counts fetches (and can be made slow or
//! failing at runtime) and a balance table keyed by card, so tests can
//! drive the whole pipeline with no network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use curio_supply::balance::BalanceLookup;
use curio_supply::feed::FeedSource;
use curio_supply::types::{ItemId, SupplyError};

pub const SAMPLE_FEED: &str =
    "Header\n1,Card One,100,10,90,5,85\n17b,Card Seventeen B,50,0,50,0,50\n";

/// A mock supply feed.
pub struct MockFeed {
    body: Mutex<String>,
    delay: Duration,
    fetches: AtomicUsize,
    force_error: AtomicBool,
}

impl MockFeed {
    pub fn new(body: &str) -> Arc<Self> {
        Self::slow(body, Duration::ZERO)
    }

    pub fn slow(body: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(body.to_string()),
            delay,
            fetches: AtomicUsize::new(0),
            force_error: AtomicBool::new(false),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_error(&self, on: bool) {
        self.force_error.store(on, Ordering::SeqCst);
    }

    pub fn set_body(&self, body: &str) {
        *self.body.lock().unwrap() = body.to_string();
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn fetch(&self) -> Result<String, SupplyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.force_error.load(Ordering::SeqCst) {
            return Err(SupplyError::Fetch {
                url: "mock://feed".into(),
                message: "forced error".into(),
            });
        }
        Ok(self.body.lock().unwrap().clone())
    }

    fn location(&self) -> &str {
        "mock://feed"
    }
}

/// Balances from a fixed table; unknown cards are 0. Records call order.
#[derive(Default)]
pub struct MockBalances {
    table: HashMap<ItemId, u64>,
    calls: Mutex<Vec<ItemId>>,
}

impl MockBalances {
    pub fn with(entries: &[(ItemId, u64)]) -> Arc<Self> {
        Arc::new(Self {
            table: entries.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ItemId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceLookup for MockBalances {
    async fn lookup(&self, id: &ItemId) -> u64 {
        self.calls.lock().unwrap().push(*id);
        self.table.get(id).copied().unwrap_or(0)
    }
}
