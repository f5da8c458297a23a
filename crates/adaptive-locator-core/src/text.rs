//! Text normalization, hashing, and token-set similarity.
//!
//! All text comparisons in the engine go through [`normalize`] first:
//! whitespace runs collapse to a single space and letters are case-folded.
//! Hashes are SHA-256 over the normalized form, so formatting-only changes
//! in markup never change a text signature.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Collapse whitespace runs and case-fold.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// SHA-256 hex digest of already-normalized text.
pub fn hash_normalized(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Unique whitespace tokens of normalized text.
pub fn tokens(normalized: &str) -> BTreeSet<&str> {
    normalized.split_whitespace().collect()
}

/// Jaccard similarity (intersection over union) of two sets.
///
/// Two empty sets are identical and score `1.0`.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}
