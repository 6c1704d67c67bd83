//! Snapshot builder.
//!
//! One build = fetch the feed once, parse it, then ask the balance
//! lookup about each parsed card in order. Only the feed fetch can fail
//! the build; balance problems were already folded into zeros by the
//! lookup.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::balance::BalanceLookup;
use crate::feed::{FeedParser, FeedSource};
use crate::types::{Snapshot, SupplyError};

/// Assembles a complete [`Snapshot`] from the feed and balance lookups.
pub struct SnapshotBuilder {
    feed: Arc<dyn FeedSource>,
    parser: FeedParser,
    balances: Arc<dyn BalanceLookup>,
}

impl SnapshotBuilder {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        parser: FeedParser,
        balances: Arc<dyn BalanceLookup>,
    ) -> Self {
        Self {
            feed,
            parser,
            balances,
        }
    }

    pub async fn build(&self) -> Result<Snapshot, SupplyError> {
        let started = Utc::now();

        let raw = self.feed.fetch().await?;
        let parsed = self.parser.parse(&raw);
        info!(
            source = self.feed.location(),
            cards = parsed.len(),
            "Feed parsed, fetching wrapped balances"
        );

        // Sequential on purpose: lookups share one rate limit.
        let mut records = Vec::with_capacity(parsed.len());
        for record in parsed {
            let wrapped = self.balances.lookup(&record.item_id).await;
            records.push(record.with_wrapped(wrapped));
        }

        let snapshot = Snapshot::new(records, started);
        info!(
            cards = snapshot.len(),
            wrapped_total = snapshot.records.iter().map(|r| r.wrapped_count).sum::<u64>(),
            "Snapshot built"
        );
        Ok(snapshot)
    }
}
