//! Best-effort extraction of a token balance from a block-explorer page.
//!
//! Two passes, first hit wins:
//! 1. the page text is searched for `Balance <digits> <LETTER>`;
//! 2. every `<div>` is visited in document order and the first number in
//!    a div that mentions "Balance" (but not one of the unrelated
//!    balance widgets) is taken.
//!
//! The page format is not under our control, so a miss is not an
//! error: the caller treats `None` as a zero balance.

use once_cell::sync::Lazy;
use regex::Regex;

/// Div texts containing any of these are not the holder balance.
const DISQUALIFYING: &[&str] = &["Check previous", "Token Balance"];

/// `Balance`, a grouped figure, then a unit starting with a letter.
static LABELLED_BALANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)balance\s*([0-9,]+)\s*[a-z]").expect("valid labelled balance regex")
});

/// A digit run, commas allowed as group separators.
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9,]*[0-9][0-9,]*").expect("valid number regex"));

/// Extract a balance from raw page HTML.
pub fn extract_balance(html: &str) -> Option<u64> {
    labelled_balance(&page_text(html)).or_else(|| div_balance(html))
}

// ---------------------------------------------------------------------------
// Pass 1: labelled figure in the page text
// ---------------------------------------------------------------------------

fn labelled_balance(text: &str) -> Option<u64> {
    LABELLED_BALANCE
        .captures_iter(text)
        .find_map(|caps| parse_grouped(&caps[1]))
}

// ---------------------------------------------------------------------------
// Pass 2: structural scan over divs
// ---------------------------------------------------------------------------

fn div_balance(html: &str) -> Option<u64> {
    div_blocks(html)
        .into_iter()
        .map(|(start, end)| page_text(&html[start..end]))
        .filter(|text| text.contains("Balance"))
        .filter(|text| !DISQUALIFYING.iter().any(|d| text.contains(d)))
        .find_map(|text| first_number(&text))
}

/// Byte ranges of every `<div ...>...</div>` element, in order of their
/// opening tags. Nested divs are matched by depth; an unclosed div runs
/// to the end of the document.
fn div_blocks(html: &str) -> Vec<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let mut tags: Vec<(usize, bool)> = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find('<') {
        let at = pos + rel;
        let rest = &lower[at..];
        if is_tag(rest, "<div") {
            tags.push((at, true));
        } else if is_tag(rest, "</div") {
            let close_end = rest.find('>').map(|i| at + i + 1).unwrap_or(html.len());
            tags.push((close_end, false));
        }
        pos = at + 1;
    }

    let mut blocks = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    for (at, is_open) in tags {
        if is_open {
            blocks.push((at, html.len()));
            open.push(blocks.len() - 1);
        } else if let Some(idx) = open.pop() {
            blocks[idx].1 = at;
        }
    }
    blocks
}

/// `rest` starts with `name` followed by whitespace, `>` or `/`.
fn is_tag(rest: &str, name: &str) -> bool {
    rest.starts_with(name)
        && rest[name.len()..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c == '/' || c.is_ascii_whitespace())
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Visible text of an HTML fragment: tags removed, `<script>`/`<style>`
/// bodies dropped, entities for spaces decoded, whitespace collapsed.
pub fn page_text(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() / 2);
    let mut pos = 0;

    while pos < html.len() {
        let Some(rel) = lower[pos..].find('<') else {
            out.push_str(&html[pos..]);
            break;
        };
        let at = pos + rel;
        out.push_str(&html[pos..at]);

        let skip_to = ["script", "style"]
            .iter()
            .find(|name| is_tag(&lower[at..], &format!("<{name}")))
            .and_then(|name| {
                let close = format!("</{name}");
                lower[at..].find(&close).map(|i| at + i)
            });
        let from = skip_to.unwrap_or(at);

        match lower[from..].find('>') {
            Some(end) => {
                out.push(' ');
                pos = from + end + 1;
            }
            None => break,
        }
    }

    normalize_ws(&out.replace("&nbsp;", " ").replace("&#160;", " "))
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First digit run in `text`.
fn first_number(text: &str) -> Option<u64> {
    NUMBER.find(text).and_then(|m| parse_grouped(m.as_str()))
}

/// `"1,234"` → 1234. Runs with no digits (or that overflow) give `None`.
fn parse_grouped(s: &str) -> Option<u64> {
    let digits: String = s.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
