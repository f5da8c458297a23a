//! In-memory [`FingerprintStore`] for tests and embedding.
//!
//! Uses a `HashMap` of [`DomainRecords`] behind `std::sync::RwLock`. A save
//! clones the domain snapshot, applies the change, and swaps it in under
//! the write lock, so readers always see a complete snapshot.

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;

use super::{ensure_domain, DomainRecords, FingerprintStore, DEFAULT_HISTORY_LIMIT};

/// Volatile store; contents vanish with the process.
pub struct InMemoryStore {
    domains: RwLock<HashMap<String, DomainRecords>>,
    history_limit: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            domains: RwLock::new(HashMap::new()),
            history_limit,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintStore for InMemoryStore {
    fn load(&self, domain_key: &str) -> DomainRecords {
        let domains = self.domains.read().unwrap_or_else(|e| e.into_inner());
        domains
            .get(domain_key)
            .cloned()
            .unwrap_or_else(|| DomainRecords::empty(domain_key))
    }

    fn save(
        &self,
        domain_key: &str,
        locator_key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        ensure_domain(domain_key, fingerprint)?;
        let mut domains = self.domains.write().unwrap_or_else(|e| e.into_inner());
        let mut next = domains
            .get(domain_key)
            .cloned()
            .unwrap_or_else(|| DomainRecords::empty(domain_key));
        next.insert(locator_key, fingerprint.clone(), self.history_limit);
        domains.insert(domain_key.to_string(), next);
        debug!(domain = domain_key, locator = locator_key, "saved fingerprint in memory");
        Ok(())
    }

    fn domains(&self) -> Vec<String> {
        let domains = self.domains.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = domains.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, DocumentBuilder};
    use crate::fingerprint::{ExtractOptions, Extractor};

    fn doc(text: &str) -> Document {
        let mut b = DocumentBuilder::new();
        b.open("p", [("data-id", "7")]);
        b.text(text);
        b.close();
        b.finish()
    }

    fn fp(domain: &str, text: &str) -> Fingerprint {
        let d = doc(text);
        let root = d.root().unwrap();
        Extractor::new(ExtractOptions::default())
            .unwrap()
            .extract(&d, root, "p", domain)
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let store = InMemoryStore::new();
        let f = fp("a.example", "hello");
        store.save("a.example", "p", &f).unwrap();
        assert_eq!(store.get("a.example", "p"), Some(f));
    }

    #[test]
    fn test_cold_start_is_empty() {
        let store = InMemoryStore::new();
        let records = store.load("nowhere.example");
        assert!(records.records.is_empty());
        assert_eq!(records.domain_key, "nowhere.example");
        assert!(store.domains().is_empty());
    }

    #[test]
    fn test_domain_isolation() {
        let store = InMemoryStore::new();
        store.save("a.example", "p", &fp("a.example", "hello")).unwrap();
        assert!(store.get("b.example", "p").is_none());
        assert!(store.list("b.example").is_empty());
        assert_eq!(store.domains(), vec!["a.example".to_string()]);
    }

    #[test]
    fn test_domain_mismatch_rejected() {
        let store = InMemoryStore::new();
        let err = store.save("b.example", "p", &fp("a.example", "x")).unwrap_err();
        assert!(matches!(err, StoreError::DomainMismatch { .. }));
        assert!(store.domains().is_empty());
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let store = InMemoryStore::with_history_limit(2);
        for text in ["v1", "v2", "v3", "v4"] {
            store.save("a.example", "p", &fp("a.example", text)).unwrap();
        }
        let latest = store.get("a.example", "p").unwrap();
        assert_eq!(latest.text_signature().snippet, "v4");
        let history: Vec<String> = store
            .history("a.example", "p")
            .into_iter()
            .map(|f| f.text_signature().snippet.clone())
            .collect();
        assert_eq!(history, vec!["v3", "v2"]);
    }
}
