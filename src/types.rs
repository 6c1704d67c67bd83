//! Core domain types for the supply snapshot service.
//!
//! All pipeline components communicate through these types:
//! FeedParser → SupplyRecord, SnapshotBuilder → Snapshot,
//! RefreshScheduler → RefreshMarker, SnapshotStore ← all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Item identifiers
// ---------------------------------------------------------------------------

/// Identifier of a tracked card.
///
/// Either a plain positive number (`17`) or a sub-edition of a base
/// number carrying a single letter suffix (`17b`). Display order is
/// numeric, with a variant placed right after its base number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemId {
    Base(u32),
    Variant { base: u32, suffix: char },
}

impl ItemId {
    fn sort_key(&self) -> (u32, Option<char>) {
        match *self {
            ItemId::Base(n) => (n, None),
            ItemId::Variant { base, suffix } => (base, Some(suffix)),
        }
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Base(n) => write!(f, "{n}"),
            ItemId::Variant { base, suffix } => write!(f, "{base}{suffix}"),
        }
    }
}

impl FromStr for ItemId {
    type Err = SupplyError;

    /// Parse `"17"` or `"17b"`. Zero, signs, whitespace inside the
    /// token and multi-letter suffixes are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SupplyError::InvalidItemId(s.to_string());
        let s = s.trim();

        let digits_end = s
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        if digits_end == 0 {
            return Err(invalid());
        }

        let base: u32 = s[..digits_end].parse().map_err(|_| invalid())?;
        if base == 0 {
            return Err(invalid());
        }

        let mut rest = s[digits_end..].chars();
        match (rest.next(), rest.next()) {
            (None, _) => Ok(ItemId::Base(base)),
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(ItemId::Variant {
                base,
                suffix: c.to_ascii_lowercase(),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Base ids go on the wire as JSON numbers, variants as strings,
/// matching what the dashboard frontend expects (`1`, `"17b"`).
impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ItemId::Base(n) => serializer.serialize_u32(*n),
            ItemId::Variant { .. } => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(0) => Err(serde::de::Error::custom("card number must be positive")),
            Raw::Number(n) => Ok(ItemId::Base(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Supply records and snapshots
// ---------------------------------------------------------------------------

/// Supply statistics for one card, as parsed from the feed plus the
/// wrapped balance found at the custodial address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyRecord {
    #[serde(rename = "cardNum")]
    pub item_id: ItemId,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "totalSupply")]
    pub total_supply: u64,
    #[serde(rename = "burned")]
    pub burned_count: u64,
    #[serde(rename = "remaining")]
    pub remaining_count: u64,
    #[serde(rename = "inactive")]
    pub inactive_count: u64,
    #[serde(rename = "active")]
    pub active_count: u64,
    /// Zero when the balance lookup failed or found nothing.
    #[serde(rename = "wrapped", default)]
    pub wrapped_count: u64,
}

impl SupplyRecord {
    /// A copy of this record carrying the given wrapped balance.
    pub fn with_wrapped(self, wrapped_count: u64) -> Self {
        Self {
            wrapped_count,
            ..self
        }
    }
}

/// The full set of card records produced by one refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "cards")]
    pub records: Vec<SupplyRecord>,
    /// Wall-clock start of the build that produced this snapshot.
    #[serde(rename = "lastUpdated")]
    pub generated_at: DateTime<Utc>,
    /// When the build finished (all balance lookups done).
    #[serde(rename = "fetchedAt")]
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Assemble a snapshot, sorting records into display order.
    pub fn new(mut records: Vec<SupplyRecord>, generated_at: DateTime<Utc>) -> Self {
        records.sort_by_key(|r| r.item_id);
        Self {
            records,
            generated_at,
            fetched_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&SupplyRecord> {
        self.records.iter().find(|r| r.item_id == *id)
    }
}

/// Bookkeeping for the refresh cadence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMarker {
    #[serde(rename = "lastFetch", default)]
    pub last_refresh_at: Option<DateTime<Utc>>,
    #[serde(rename = "nextScheduledFetch", default)]
    pub next_scheduled_at: Option<DateTime<Utc>>,
}

impl RefreshMarker {
    /// Marker for a refresh completed at `at`, next one due `interval` later.
    pub fn completed(at: DateTime<Utc>, interval: chrono::Duration) -> Self {
        Self {
            last_refresh_at: Some(at),
            next_scheduled_at: Some(at + interval),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the refresh pipeline.
///
/// Only `Fetch` and `Persist` ever escape a refresh; `Lookup` is
/// recovered inside the balance lookup as a zero balance.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SupplyError {
    #[error("Feed fetch failed ({url}): {message}")]
    Fetch { url: String, message: String },

    #[error("Balance lookup failed for card {item}: {message}")]
    Lookup { item: ItemId, message: String },

    #[error("Storage error ({path}): {message}")]
    Persist { path: String, message: String },

    #[error("Invalid card identifier: {0:?}")]
    InvalidItemId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refresh task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
