//! Parser for the comma-delimited card supply table.
//!
//! Layout: one header line, then one card per line:
//! `id,name,total,burned,remaining,inactive,active[,...]`.
//! The upstream table has no schema guarantee, so bad rows are dropped
//! rather than failing the whole parse.

use tracing::debug;

use crate::types::{ItemId, SupplyRecord};

/// Minimum number of fields a row needs to be considered.
const MIN_FIELDS: usize = 7;

/// Turns raw feed text into display-ordered supply records.
#[derive(Debug, Clone)]
pub struct FeedParser {
    /// Suffixed identifiers accepted in the id column.
    variants: Vec<ItemId>,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new(vec![ItemId::Variant { base: 17, suffix: 'b' }])
    }
}

impl FeedParser {
    pub fn new(variants: Vec<ItemId>) -> Self {
        Self { variants }
    }

    /// Parse the feed. Never fails; malformed rows are skipped.
    pub fn parse(&self, raw: &str) -> Vec<SupplyRecord> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in raw.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.parse_row(line) {
                Some(rec) => records.push(rec),
                None => {
                    skipped += 1;
                    debug!(line = line_no + 1, row = line, "Skipping malformed feed row");
                }
            }
        }

        // Stable sort: duplicate ids keep their feed order.
        records.sort_by_key(|r| r.item_id);

        debug!(parsed = records.len(), skipped, "Feed parsed");
        records
    }

    fn parse_row(&self, line: &str) -> Option<SupplyRecord> {
        let fields = split_fields(line);
        if fields.len() < MIN_FIELDS {
            return None;
        }

        let item_id = self.parse_id(&fields[0])?;
        let display_name = fields[1].trim();
        if display_name.is_empty() {
            return None;
        }

        Some(SupplyRecord {
            item_id,
            display_name: display_name.to_string(),
            total_supply: count(&fields[2]),
            burned_count: count(&fields[3]),
            remaining_count: count(&fields[4]),
            inactive_count: count(&fields[5]),
            active_count: count(&fields[6]),
            wrapped_count: 0,
        })
    }

    fn parse_id(&self, field: &str) -> Option<ItemId> {
        match field.trim().parse::<ItemId>().ok()? {
            id @ ItemId::Base(_) => Some(id),
            id @ ItemId::Variant { .. } if self.variants.contains(&id) => Some(id),
            ItemId::Variant { .. } => None,
        }
    }
}

/// Split one line on commas. Double-quoted fields may contain commas,
/// and `""` inside quotes is a literal quote.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parse a count column from its leading digits (`"7.5"` is 7, `"85abc"`
/// is 85). No leading digit, a sign, or overflow counts as 0.
fn count(field: &str) -> u64 {
    let field = field.trim();
    let end = field
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(field.len());
    field[..end].parse().unwrap_or(0)
}
