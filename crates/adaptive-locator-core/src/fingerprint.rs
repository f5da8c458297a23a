//! Fingerprint extraction.
//!
//! A [`Fingerprint`] is a bounded, persistable description of one element:
//! its tag, a text signature, the attributes judged stable, and a small
//! structural neighbourhood (child tags, up to three ancestor tags, and
//! sibling position). It is what the relocation search compares live
//! elements against once the original locator stops matching.
//!
//! Extraction is a pure function of the element's tree neighbourhood. Every
//! collection is truncated to a documented bound so a pathological document
//! cannot produce an unbounded record:
//!
//! | Bound | Default |
//! |-------|---------|
//! | text snippet | [`DEFAULT_MAX_TEXT_SNIPPET_LEN`] chars |
//! | stable attributes | [`DEFAULT_MAX_ATTRIBUTE_COUNT`] pairs |
//! | attribute value | [`MAX_ATTRIBUTE_VALUE_LEN`] bytes |
//! | child tags | [`MAX_CHILD_TAGS`] |
//! | ancestor tags | [`PARENT_CHAIN_DEPTH`] |
//!
//! # Stable attributes
//!
//! Only attribute keys matching the allowlist globs are considered
//! (`id`, `class`, `data-*`, `aria-*` by default). `class` is split into
//! tokens. Values that look generated (numeric-only tokens, long
//! digit-heavy segments such as `css-1x9fk2a`) or that match the value
//! denylist globs are dropped.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dom::{Document, ElementData, NodeId};
use crate::error::{Error, Result};
use crate::text;

pub const DEFAULT_MAX_TEXT_SNIPPET_LEN: usize = 256;
pub const DEFAULT_MAX_ATTRIBUTE_COUNT: usize = 32;
pub const MAX_ATTRIBUTE_VALUE_LEN: usize = 128;
pub const MAX_CHILD_TAGS: usize = 64;
pub const PARENT_CHAIN_DEPTH: usize = 3;

/// Normalized text hash plus a bounded snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSignature {
    /// SHA-256 hex of the full normalized text.
    pub hash: String,
    /// Normalized text, truncated to the snippet bound.
    pub snippet: String,
}

/// Persisted description of a previously located element.
///
/// Fingerprints are immutable: a refresh produces a new value that
/// replaces the stored one. Fields added after the first release carry
/// `#[serde(default)]` so older records still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    domain_key: String,
    locator_key: String,
    tag: String,
    text_signature: TextSignature,
    stable_attributes: BTreeSet<(String, String)>,
    child_tag_sequence: Vec<String>,
    parent_tag_chain: Vec<String>,
    #[serde(default)]
    sibling_index: usize,
    #[serde(default)]
    sibling_count: usize,
    #[serde(default)]
    depth: usize,
    saved_at: DateTime<Utc>,
}

impl Fingerprint {
    pub fn domain_key(&self) -> &str {
        &self.domain_key
    }

    pub fn locator_key(&self) -> &str {
        &self.locator_key
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn text_signature(&self) -> &TextSignature {
        &self.text_signature
    }

    pub fn stable_attributes(&self) -> &BTreeSet<(String, String)> {
        &self.stable_attributes
    }

    pub fn child_tag_sequence(&self) -> &[String] {
        &self.child_tag_sequence
    }

    /// Ancestor tags, nearest first.
    pub fn parent_tag_chain(&self) -> &[String] {
        &self.parent_tag_chain
    }

    pub fn sibling_index(&self) -> usize {
        self.sibling_index
    }

    /// `0` means unknown (records written before positions were tracked).
    pub fn sibling_count(&self) -> usize {
        self.sibling_count
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }
}

/// Comparable features of a live element.
///
/// Computed with the same rules as a [`Fingerprint`] so the scorer compares
/// like with like.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub node: NodeId,
    pub tag: String,
    pub text: TextSignature,
    pub stable_attributes: BTreeSet<(String, String)>,
    pub child_tags: Vec<String>,
    pub parent_chain: Vec<String>,
    pub sibling_index: usize,
    pub sibling_count: usize,
    pub depth: usize,
    pub order: usize,
}

/// Tunable extraction bounds and attribute filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub max_text_snippet_len: usize,
    pub max_attribute_count: usize,
    /// Glob patterns over attribute keys.
    pub attribute_allowlist: Vec<String>,
    /// Glob patterns over attribute values (class tokens individually).
    pub value_denylist: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_text_snippet_len: DEFAULT_MAX_TEXT_SNIPPET_LEN,
            max_attribute_count: DEFAULT_MAX_ATTRIBUTE_COUNT,
            attribute_allowlist: default_allowlist(),
            value_denylist: default_denylist(),
        }
    }
}

pub fn default_allowlist() -> Vec<String> {
    ["id", "class", "data-*", "aria-*"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_denylist() -> Vec<String> {
    ["css-*", "sc-*", "jsx-*"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Compiled [`ExtractOptions`].
#[derive(Debug, Clone)]
pub struct Extractor {
    options: ExtractOptions,
    allow: GlobSet,
    deny: GlobSet,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Result<Self> {
        if options.max_text_snippet_len == 0 {
            return Err(Error::InvalidConfig(
                "max_text_snippet_len must be > 0".to_string(),
            ));
        }
        let allow = compile_globs("attribute_allowlist", &options.attribute_allowlist)?;
        let deny = compile_globs("value_denylist", &options.value_denylist)?;
        Ok(Self {
            options,
            allow,
            deny,
        })
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Build a fingerprint for `node`, stamped with the current time.
    pub fn extract(
        &self,
        doc: &Document,
        node: NodeId,
        locator: &str,
        domain_key: &str,
    ) -> Result<Fingerprint> {
        let f = self.features(doc, node)?;
        Ok(Fingerprint {
            domain_key: domain_key.to_string(),
            locator_key: locator.to_string(),
            tag: f.tag,
            text_signature: f.text,
            stable_attributes: f.stable_attributes,
            child_tag_sequence: f.child_tags,
            parent_tag_chain: f.parent_chain,
            sibling_index: f.sibling_index,
            sibling_count: f.sibling_count,
            depth: f.depth,
            saved_at: Utc::now(),
        })
    }

    /// Compute comparable features for `node`.
    pub fn features(&self, doc: &Document, node: NodeId) -> Result<Features> {
        let el = doc.element(node).ok_or(Error::DetachedElement(node))?;

        let normalized = text::normalize(&doc.text(node));
        let snippet = text::truncate_chars(&normalized, self.options.max_text_snippet_len);
        let signature = TextSignature {
            hash: text::hash_normalized(&normalized),
            snippet: snippet.to_string(),
        };

        let child_tags = doc
            .children(node)
            .take(MAX_CHILD_TAGS)
            .filter_map(|c| doc.element(c))
            .map(|c| c.tag().to_string())
            .collect();
        let parent_chain = doc
            .ancestors(node)
            .take(PARENT_CHAIN_DEPTH)
            .filter_map(|p| doc.element(p))
            .map(|p| p.tag().to_string())
            .collect();

        Ok(Features {
            node,
            tag: el.tag().to_string(),
            text: signature,
            stable_attributes: self.stable_attributes(el),
            child_tags,
            parent_chain,
            sibling_index: el.sibling_index(),
            sibling_count: el.sibling_count(),
            depth: el.depth(),
            order: el.order(),
        })
    }

    /// Allowlisted, non-volatile `(key, value)` pairs, bounded in count.
    pub fn stable_attributes(&self, el: &ElementData) -> BTreeSet<(String, String)> {
        let mut out = BTreeSet::new();
        for (key, value) in el.attributes() {
            if !self.allow.is_match(key.as_str()) {
                continue;
            }
            if key == "class" {
                for token in value.split_whitespace() {
                    if !looks_generated(token) && !self.deny.is_match(token) {
                        out.insert((key.clone(), token.to_string()));
                    }
                }
                continue;
            }
            let value = value.trim();
            if value.len() > MAX_ATTRIBUTE_VALUE_LEN || self.deny.is_match(value) {
                continue;
            }
            if key == "id" && looks_generated(value) {
                continue;
            }
            out.insert((key.clone(), value.to_string()));
        }
        if out.len() > self.options.max_attribute_count {
            out = out
                .into_iter()
                .take(self.options.max_attribute_count)
                .collect();
        }
        out
    }
}

fn compile_globs(field: &str, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let glob = Glob::new(p)
            .map_err(|e| Error::InvalidConfig(format!("{}: bad pattern '{}': {}", field, p, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidConfig(format!("{}: {}", field, e)))
}

/// Heuristic for auto-generated class and id tokens.
///
/// Flags numeric-only tokens and any `-`/`_` separated segment of five or
/// more characters that mixes letters with at least two digits.
pub fn looks_generated(token: &str) -> bool {
    let is_sep = |c: char| c == '-' || c == '_';
    let t = token.trim_matches(is_sep);
    if t.is_empty() || t.chars().all(|c| c.is_ascii_digit() || is_sep(c)) {
        return true;
    }
    t.split(is_sep).any(|seg| {
        let digits = seg.chars().filter(char::is_ascii_digit).count();
        let letters = seg.chars().filter(char::is_ascii_alphabetic).count();
        seg.chars().count() >= 5 && digits >= 2 && letters >= 1
    })
}
