//! Fingerprint storage abstraction.
//!
//! The [`FingerprintStore`] trait is the only stateful seam of the engine.
//! Records are scoped by domain key; each domain holds one
//! [`LocatorRecord`] per locator key (latest fingerprint plus a bounded
//! history kept for diagnostics only).
//!
//! Implementations must uphold:
//!
//! | Rule | Meaning |
//! |------|---------|
//! | cold start | a missing or unreadable domain loads as empty, never an error |
//! | atomic commit | readers see the old or the new snapshot, never a torn one |
//! | single writer | saves to one domain are serialized |
//! | isolation | a lookup under one domain never returns another domain's records |
//!
//! Stores are injected per call (`&dyn FingerprintStore`) rather than held
//! globally, so several engines can share or separate their stores.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Latest fingerprint for one locator plus superseded versions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorRecord {
    pub latest: Fingerprint,
    #[serde(default)]
    pub history: Vec<Fingerprint>,
}

/// Everything stored for one domain key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecords {
    #[serde(default = "schema_version")]
    pub schema: u32,
    pub domain_key: String,
    #[serde(default)]
    pub records: BTreeMap<String, LocatorRecord>,
}

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

impl DomainRecords {
    pub fn empty(domain_key: &str) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            domain_key: domain_key.to_string(),
            records: BTreeMap::new(),
        }
    }

    pub fn get(&self, locator_key: &str) -> Option<&Fingerprint> {
        self.records.get(locator_key).map(|r| &r.latest)
    }

    /// Latest fingerprint per locator key.
    pub fn latest(&self) -> BTreeMap<String, Fingerprint> {
        self.records
            .iter()
            .map(|(k, r)| (k.clone(), r.latest.clone()))
            .collect()
    }

    /// Replace the latest fingerprint for `locator_key`, pushing the
    /// previous one onto the front of its history.
    pub fn insert(&mut self, locator_key: &str, fingerprint: Fingerprint, history_limit: usize) {
        match self.records.get_mut(locator_key) {
            Some(record) => {
                let previous = std::mem::replace(&mut record.latest, fingerprint);
                record.history.insert(0, previous);
                record.history.truncate(history_limit);
            }
            None => {
                self.records.insert(
                    locator_key.to_string(),
                    LocatorRecord {
                        latest: fingerprint,
                        history: Vec::new(),
                    },
                );
            }
        }
    }
}

/// Durable, domain-scoped fingerprint persistence.
pub trait FingerprintStore: Send + Sync {
    /// All records for `domain_key`; empty on a cold start or unreadable data.
    fn load(&self, domain_key: &str) -> DomainRecords;

    /// Persist `fingerprint` as the latest version for `locator_key`.
    fn save(
        &self,
        domain_key: &str,
        locator_key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError>;

    /// Domain keys with at least one committed record.
    fn domains(&self) -> Vec<String>;

    /// Latest fingerprint per locator key for `domain_key`.
    fn list(&self, domain_key: &str) -> BTreeMap<String, Fingerprint> {
        self.load(domain_key).latest()
    }

    fn get(&self, domain_key: &str, locator_key: &str) -> Option<Fingerprint> {
        self.load(domain_key)
            .records
            .remove(locator_key)
            .map(|r| r.latest)
    }

    /// Superseded versions for one locator, newest first.
    fn history(&self, domain_key: &str, locator_key: &str) -> Vec<Fingerprint> {
        self.load(domain_key)
            .records
            .remove(locator_key)
            .map(|r| r.history)
            .unwrap_or_default()
    }
}

/// Reject a fingerprint whose own domain differs from the target domain.
pub fn ensure_domain(domain_key: &str, fingerprint: &Fingerprint) -> Result<(), StoreError> {
    if fingerprint.domain_key() != domain_key {
        return Err(StoreError::DomainMismatch {
            fingerprint: fingerprint.domain_key().to_string(),
            target: domain_key.to_string(),
        });
    }
    Ok(())
}

/// Explicit mapping from alias hosts to a canonical domain key.
///
/// Lets e.g. an archive mirror and the live site share fingerprints.
/// Without an entry, every host is its own domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAliases {
    map: BTreeMap<String, String>,
}

impl DomainAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `alias` to `canonical`. Chains collapse at link time.
    pub fn link(&mut self, alias: &str, canonical: &str) {
        let target = self.resolve(canonical).to_string();
        if target != alias {
            self.map.insert(alias.to_string(), target);
        }
    }

    pub fn resolve<'a>(&'a self, domain_key: &'a str) -> &'a str {
        self.map
            .get(domain_key)
            .map(String::as_str)
            .unwrap_or(domain_key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for DomainAliases {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut aliases = Self::new();
        for (alias, canonical) in iter {
            aliases.link(alias.as_ref(), canonical.as_ref());
        }
        aliases
    }
}
