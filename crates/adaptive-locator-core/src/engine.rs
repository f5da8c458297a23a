//! Adaptive orchestration: literal lookup first, relocation on a miss.
//!
//! [`Engine::locate`] is the single entry point callers use. It evaluates
//! the literal locator through a [`LocatorResolver`]; when that comes back
//! empty in [`Mode::Adaptive`], it loads the stored fingerprint for
//! `(domain, locator)` and runs the [relocation search](crate::relocate).
//! Every path ends in the same [`Located`] shape.
//!
//! # Refresh policy
//!
//! Fingerprint writes are always explicit:
//!
//! | Trigger | Condition |
//! |---------|-----------|
//! | literal hit | `LocateRequest::save` is set |
//! | relocation | `Options::refresh_on_relocate` is set |
//!
//! A refresh that fails to write is reported in [`Located::refresh`]; the
//! located elements are still returned.

use serde::Serialize;
use std::borrow::Cow;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId};
use crate::error::{Error, Result, StoreError};
use crate::fingerprint::{ExtractOptions, Extractor, Fingerprint};
use crate::relocate::{
    relocate, Budget, CancelToken, MatchCandidate, RelocateParams, DEFAULT_EXPLAIN_LIMIT,
    DEFAULT_THRESHOLD,
};
use crate::score::{Score, Weights};
use crate::store::{DomainAliases, FingerprintStore};

/// Evaluates a literal locator against a document.
///
/// Implementations return matches in document order and reject malformed
/// locators with [`Error::InvalidLocator`].
pub trait LocatorResolver: Send + Sync {
    fn resolve(&self, doc: &Document, locator: &str) -> Result<Vec<NodeId>>;
}

impl<F> LocatorResolver for F
where
    F: Fn(&Document, &str) -> Result<Vec<NodeId>> + Send + Sync,
{
    fn resolve(&self, doc: &Document, locator: &str) -> Result<Vec<NodeId>> {
        self(doc, locator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Literal evaluation only.
    Literal,
    /// Literal first, relocation on an empty result.
    Adaptive,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "literal" | "literal_only" => Ok(Mode::Literal),
            "adaptive" => Ok(Mode::Adaptive),
            other => Err(Error::InvalidConfig(format!(
                "Unknown mode: '{}'. Use literal or adaptive.",
                other
            ))),
        }
    }
}

/// How a locate call found its elements.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Literal(Vec<NodeId>),
    Relocated(Vec<NodeId>, Vec<Score>),
    NoMatch,
}

impl MatchResult {
    pub fn elements(&self) -> &[NodeId] {
        match self {
            MatchResult::Literal(nodes) | MatchResult::Relocated(nodes, _) => nodes,
            MatchResult::NoMatch => &[],
        }
    }

    pub fn is_match(&self) -> bool {
        !self.elements().is_empty()
    }
}

/// Outcome of a fingerprint refresh attempted during a locate call.
#[derive(Debug)]
pub enum Refresh {
    NotRequested,
    Saved,
    Failed(StoreError),
}

/// Result of [`Engine::locate`].
#[derive(Debug)]
pub struct Located {
    pub result: MatchResult,
    pub refresh: Refresh,
    /// Ranked relocation candidates (empty unless relocation ran).
    pub candidates: Vec<MatchCandidate>,
    /// Canonical domain key, when one was needed.
    pub domain_key: Option<String>,
}

/// Process-wide engine defaults.
#[derive(Debug, Clone)]
pub struct Options {
    pub weights: Weights,
    pub threshold: f64,
    pub explain_limit: usize,
    pub extract: ExtractOptions,
    pub refresh_on_relocate: bool,
    pub time_budget: Option<Duration>,
    pub aliases: DomainAliases,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            threshold: DEFAULT_THRESHOLD,
            explain_limit: DEFAULT_EXPLAIN_LIMIT,
            extract: ExtractOptions::default(),
            refresh_on_relocate: false,
            time_budget: None,
            aliases: DomainAliases::new(),
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidConfig(format!(
                "threshold must be in [0.0, 1.0] (got {})",
                self.threshold
            )));
        }
        if self.explain_limit == 0 {
            return Err(Error::InvalidConfig("explain_limit must be >= 1".to_string()));
        }
        Ok(())
    }

    fn apply(&self, o: &Overrides) -> Options {
        let mut next = self.clone();
        if let Some(w) = o.weights {
            next.weights = w;
        }
        if let Some(t) = o.threshold {
            next.threshold = t;
        }
        if let Some(list) = &o.attribute_allowlist {
            next.extract.attribute_allowlist = list.clone();
        }
        if let Some(n) = o.max_text_snippet_len {
            next.extract.max_text_snippet_len = n;
        }
        if let Some(n) = o.max_attribute_count {
            next.extract.max_attribute_count = n;
        }
        if let Some(r) = o.refresh_on_relocate {
            next.refresh_on_relocate = r;
        }
        next
    }
}

/// Partial settings, applied process-wide by [`Engine::configure`] or to a
/// single call through [`LocateRequest::overrides`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub weights: Option<Weights>,
    pub threshold: Option<f64>,
    pub attribute_allowlist: Option<Vec<String>>,
    pub max_text_snippet_len: Option<usize>,
    pub max_attribute_count: Option<usize>,
    pub refresh_on_relocate: Option<bool>,
}

/// Inputs for one [`Engine::locate`] call.
#[derive(Debug, Clone)]
pub struct LocateRequest<'a> {
    pub document: &'a Document,
    pub locator: &'a str,
    /// Overrides the document host as the domain key.
    pub domain_key: Option<&'a str>,
    pub mode: Mode,
    /// Refresh the stored fingerprint on a literal hit.
    pub save: bool,
    pub overrides: Option<&'a Overrides>,
    pub cancel: Option<CancelToken>,
}

impl<'a> LocateRequest<'a> {
    pub fn new(document: &'a Document, locator: &'a str, mode: Mode) -> Self {
        Self {
            document,
            locator,
            domain_key: None,
            mode,
            save: false,
            overrides: None,
            cancel: None,
        }
    }

    pub fn domain(mut self, domain_key: &'a str) -> Self {
        self.domain_key = Some(domain_key);
        self
    }

    pub fn save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn overrides(mut self, overrides: &'a Overrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Options and compiled extractor in effect for one call.
struct Profile<'e> {
    options: Cow<'e, Options>,
    extractor: Cow<'e, Extractor>,
}

impl Profile<'_> {
    fn params(&self) -> RelocateParams {
        RelocateParams {
            weights: self.options.weights,
            threshold: self.options.threshold,
            explain_limit: self.options.explain_limit,
        }
    }
}

/// The adaptive element relocation engine.
#[derive(Debug, Clone)]
pub struct Engine {
    options: Options,
    extractor: Extractor,
}

impl Engine {
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        let extractor = Extractor::new(options.extract.clone())?;
        Ok(Self { options, extractor })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Replace process-wide defaults. Nothing changes if validation fails.
    pub fn configure(&mut self, overrides: &Overrides) -> Result<()> {
        *self = Engine::new(self.options.apply(overrides))?;
        Ok(())
    }

    /// Find the elements `locator` refers to, relocating if needed.
    pub fn locate(
        &self,
        store: &dyn FingerprintStore,
        resolver: &dyn LocatorResolver,
        req: &LocateRequest<'_>,
    ) -> Result<Located> {
        let profile = self.profile(req.overrides)?;
        let doc = req.document;

        let found = resolver.resolve(doc, req.locator)?;
        if !found.is_empty() {
            let (refresh, domain_key) = if req.save {
                let domain = self.domain_for(req)?;
                let refresh = self.refresh(store, &profile.extractor, doc, found[0], req.locator, &domain)?;
                (refresh, Some(domain))
            } else {
                (Refresh::NotRequested, None)
            };
            return Ok(Located {
                result: MatchResult::Literal(found),
                refresh,
                candidates: Vec::new(),
                domain_key,
            });
        }

        if req.mode == Mode::Literal {
            return Ok(no_match(None, Vec::new()));
        }

        let domain = self.domain_for(req)?;
        let Some(fp) = store.get(&domain, req.locator) else {
            debug!(domain = %domain, locator = req.locator, "no stored fingerprint");
            return Ok(no_match(Some(domain), Vec::new()));
        };

        let budget = Budget {
            cancel: req.cancel.clone(),
            deadline: profile.options.time_budget.map(|d| Instant::now() + d),
        };
        let relocation = relocate(doc, &fp, &profile.extractor, &profile.params(), &budget)?;

        let Some(winner) = relocation.winner else {
            return Ok(no_match(Some(domain), relocation.ranked));
        };

        let refresh = if profile.options.refresh_on_relocate {
            self.refresh(store, &profile.extractor, doc, winner.node, req.locator, &domain)?
        } else {
            Refresh::NotRequested
        };

        Ok(Located {
            result: MatchResult::Relocated(vec![winner.node], vec![winner.score]),
            refresh,
            candidates: relocation.ranked,
            domain_key: Some(domain),
        })
    }

    /// Save a fingerprint of `element` under `(domain, locator)`.
    ///
    /// `domain_key` falls back to the document host.
    pub fn save_fingerprint(
        &self,
        store: &dyn FingerprintStore,
        document: &Document,
        locator: &str,
        domain_key: Option<&str>,
        element: NodeId,
    ) -> Result<Fingerprint> {
        let domain = self.canonical_domain(domain_key, document)?;
        let fp = self.extractor.extract(document, element, locator, &domain)?;
        store.save(&domain, locator, &fp)?;
        info!(domain = %domain, locator, "saved fingerprint");
        Ok(fp)
    }

    fn profile(&self, overrides: Option<&Overrides>) -> Result<Profile<'_>> {
        match overrides {
            None => Ok(Profile {
                options: Cow::Borrowed(&self.options),
                extractor: Cow::Borrowed(&self.extractor),
            }),
            Some(o) => {
                let options = self.options.apply(o);
                options.validate()?;
                let extractor = if options.extract == self.options.extract {
                    Cow::Borrowed(&self.extractor)
                } else {
                    Cow::Owned(Extractor::new(options.extract.clone())?)
                };
                Ok(Profile {
                    options: Cow::Owned(options),
                    extractor,
                })
            }
        }
    }

    fn domain_for(&self, req: &LocateRequest<'_>) -> Result<String> {
        self.canonical_domain(req.domain_key, req.document)
    }

    fn canonical_domain(&self, explicit: Option<&str>, doc: &Document) -> Result<String> {
        let raw = explicit.or_else(|| doc.host()).ok_or(Error::MissingDomain)?;
        Ok(self.options.aliases.resolve(raw).to_string())
    }

    fn refresh(
        &self,
        store: &dyn FingerprintStore,
        extractor: &Extractor,
        doc: &Document,
        node: NodeId,
        locator: &str,
        domain: &str,
    ) -> Result<Refresh> {
        let fp = extractor.extract(doc, node, locator, domain)?;
        match store.save(domain, locator, &fp) {
            Ok(()) => {
                info!(domain, locator, "refreshed fingerprint");
                Ok(Refresh::Saved)
            }
            Err(e) => {
                warn!(domain, locator, error = %e, "fingerprint refresh failed");
                Ok(Refresh::Failed(e))
            }
        }
    }
}

fn no_match(domain_key: Option<String>, candidates: Vec<MatchCandidate>) -> Located {
    Located {
        result: MatchResult::NoMatch,
        refresh: Refresh::NotRequested,
        candidates,
        domain_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DocumentBuilder;
    use crate::store::memory::InMemoryStore;

    fn none() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// Matches `.class` locators only.
    fn class_resolver(doc: &Document, locator: &str) -> Result<Vec<NodeId>> {
        let class = locator
            .strip_prefix('.')
            .ok_or_else(|| Error::InvalidLocator {
                locator: locator.to_string(),
                reason: "expected .class".to_string(),
            })?;
        Ok(doc
            .elements()
            .iter()
            .copied()
            .filter(|&id| doc.element(id).is_some_and(|e| e.classes().any(|c| c == class)))
            .collect())
    }

    fn v1() -> Document {
        let mut b = DocumentBuilder::new();
        b.set_host("shop.example");
        b.open("div", [("class", "product-card")]);
        b.open("h2", [("class", "product-name")]);
        b.text("Gaming Laptop");
        b.close();
        b.open("span", [("class", "product-price")]);
        b.text("$999.99");
        b.close();
        b.close();
        b.finish()
    }

    fn v2() -> Document {
        let mut b = DocumentBuilder::new();
        b.set_host("shop.example");
        b.open("article", [("class", "item")]);
        b.open("span", [("class", "item-label")]);
        b.text("Gaming Laptop");
        b.close();
        b.open("output", [("class", "item-cost")]);
        b.text("$999.99");
        b.close();
        b.close();
        b.finish()
    }

    fn engine() -> Engine {
        Engine::new(Options::default()).unwrap()
    }

    #[test]
    fn test_literal_hit_without_save_touches_nothing() {
        let store = InMemoryStore::new();
        let doc = v1();
        let req = LocateRequest::new(&doc, ".product-card", Mode::Adaptive);
        let located = engine().locate(&store, &class_resolver, &req).unwrap();
        assert!(matches!(located.result, MatchResult::Literal(ref n) if n.len() == 1));
        assert!(matches!(located.refresh, Refresh::NotRequested));
        assert!(store.domains().is_empty());
    }

    #[test]
    fn test_save_then_relocate() {
        let store = InMemoryStore::new();
        let e = engine();
        let old = v1();
        let saved = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&old, ".product-card", Mode::Literal).save(true),
            )
            .unwrap();
        assert!(matches!(saved.refresh, Refresh::Saved));
        assert_eq!(saved.domain_key.as_deref(), Some("shop.example"));

        let new = v2();
        let located = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive),
            )
            .unwrap();
        match located.result {
            MatchResult::Relocated(nodes, scores) => {
                assert_eq!(new.element(nodes[0]).unwrap().tag(), "article");
                assert_eq!(scores[0].sub.text, 1.0);
                assert!(scores[0].total >= 0.70);
            }
            other => panic!("expected relocation, got {:?}", other),
        }
        // refresh_on_relocate is off by default
        assert!(matches!(located.refresh, Refresh::NotRequested));
        assert_eq!(store.get("shop.example", ".product-card").unwrap().tag(), "div");
    }

    #[test]
    fn test_literal_mode_never_relocates() {
        let store = InMemoryStore::new();
        let e = engine();
        let old = v1();
        let root = old.root().unwrap();
        e.save_fingerprint(&store, &old, ".product-card", None, root)
            .unwrap();
        let new = v2();
        let located = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Literal),
            )
            .unwrap();
        assert_eq!(located.result, MatchResult::NoMatch);
    }

    #[test]
    fn test_cold_start_is_no_match() {
        let store = InMemoryStore::new();
        let doc = v2();
        let located = engine()
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&doc, ".product-card", Mode::Adaptive),
            )
            .unwrap();
        assert_eq!(located.result, MatchResult::NoMatch);
        assert!(located.candidates.is_empty());
    }

    #[test]
    fn test_refresh_on_relocate_updates_store() {
        let store = InMemoryStore::new();
        let mut e = engine();
        e.configure(&Overrides {
            refresh_on_relocate: Some(true),
            ..Default::default()
        })
        .unwrap();
        let old = v1();
        e.save_fingerprint(&store, &old, ".product-card", None, old.root().unwrap())
            .unwrap();
        let new = v2();
        let located = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive),
            )
            .unwrap();
        assert!(matches!(located.refresh, Refresh::Saved));
        assert_eq!(store.get("shop.example", ".product-card").unwrap().tag(), "article");
        assert_eq!(store.history("shop.example", ".product-card").len(), 1);
    }

    #[test]
    fn test_invalid_locator_is_surfaced() {
        let store = InMemoryStore::new();
        let doc = v1();
        let err = engine()
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&doc, "div", Mode::Adaptive),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLocator { .. }));
    }

    #[test]
    fn test_missing_domain() {
        let store = InMemoryStore::new();
        let mut b = DocumentBuilder::new();
        b.open("p", none());
        b.close();
        let doc = b.finish();
        let err = engine()
            .locate(&store, &class_resolver, &LocateRequest::new(&doc, ".x", Mode::Adaptive))
            .unwrap_err();
        assert!(matches!(err, Error::MissingDomain));
    }

    #[test]
    fn test_aliases_share_fingerprints() {
        let store = InMemoryStore::new();
        let options = Options {
            aliases: [("mirror.example", "shop.example")].into_iter().collect(),
            ..Default::default()
        };
        let e = Engine::new(options).unwrap();
        let old = v1();
        e.save_fingerprint(&store, &old, ".product-card", Some("mirror.example"), old.root().unwrap())
            .unwrap();
        assert!(store.get("shop.example", ".product-card").is_some());

        let new = v2();
        let located = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive).domain("mirror.example"),
            )
            .unwrap();
        assert!(matches!(located.result, MatchResult::Relocated(..)));

        let isolated = engine()
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive).domain("mirror.example"),
            )
            .unwrap();
        assert_eq!(isolated.result, MatchResult::NoMatch);
    }

    #[test]
    fn test_cancelled_locate_never_writes() {
        let store = InMemoryStore::new();
        let mut e = engine();
        e.configure(&Overrides {
            refresh_on_relocate: Some(true),
            ..Default::default()
        })
        .unwrap();
        let old = v1();
        e.save_fingerprint(&store, &old, ".product-card", None, old.root().unwrap())
            .unwrap();
        let before = store.load("shop.example");

        let token = CancelToken::new();
        token.cancel();
        let new = v2();
        let err = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive).cancel(token),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(store.load("shop.example"), before);
    }

    #[test]
    fn test_per_call_threshold_override() {
        let store = InMemoryStore::new();
        let e = engine();
        let old = v1();
        e.save_fingerprint(&store, &old, ".product-card", None, old.root().unwrap())
            .unwrap();
        let strict = Overrides {
            threshold: Some(0.99),
            ..Default::default()
        };
        let new = v2();
        let located = e
            .locate(
                &store,
                &class_resolver,
                &LocateRequest::new(&new, ".product-card", Mode::Adaptive).overrides(&strict),
            )
            .unwrap();
        assert_eq!(located.result, MatchResult::NoMatch);
        assert!(!located.candidates.is_empty());
        assert_eq!(e.options().threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_configure_rejects_bad_weights() {
        let mut e = engine();
        let err = e
            .configure(&Overrides {
                weights: Some(Weights {
                    text: 1.0,
                    attr: 1.0,
                    structure: 0.0,
                    position: 0.0,
                }),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(e.options().weights, Weights::default());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("adaptive".parse::<Mode>().unwrap(), Mode::Adaptive);
        assert_eq!("literal_only".parse::<Mode>().unwrap(), Mode::Literal);
        assert!("fuzzy".parse::<Mode>().is_err());
    }
}
