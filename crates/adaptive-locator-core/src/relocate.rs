//! Relocation search.
//!
//! Finds the element in a new document that best corresponds to a stored
//! [`Fingerprint`].
//!
//! # Algorithm
//!
//! 1. Build the candidate set in one reverse-document-order pass: an
//!    element is a candidate when its aggregated text shares at least one
//!    token with the fingerprint snippet. An empty snippet falls back to
//!    every element with the fingerprint's tag.
//! 2. Score every candidate (in parallel via `rayon`; the collect keeps
//!    input order).
//! 3. Rank by total score (desc), then by distance from the fingerprint's
//!    original depth (asc), then by document order (asc). The ranking is a
//!    total order, so the winner never depends on execution order.
//! 4. Accept the top candidate only if it reaches the threshold.
//!
//! A [`Budget`] bounds the call. When it trips, the whole evaluation is
//! discarded and [`Error::Cancelled`] is returned; a partial winner is
//! never reported.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::error::{CancelReason, Error, Result};
use crate::fingerprint::{Extractor, Fingerprint};
use crate::score::{score, Score, Weights};
use crate::text;

pub const DEFAULT_THRESHOLD: f64 = 0.70;
pub const DEFAULT_EXPLAIN_LIMIT: usize = 5;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

/// Cancellation token and deadline for one call.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    pub cancel: Option<CancelToken>,
    pub deadline: Option<Instant>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: None,
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled(CancelReason::Requested));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled(CancelReason::DeadlineExceeded));
        }
        Ok(())
    }
}

/// Scoring parameters for one relocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelocateParams {
    pub weights: Weights,
    pub threshold: f64,
    /// How many ranked candidates to keep for diagnostics.
    pub explain_limit: usize,
}

impl Default for RelocateParams {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            threshold: DEFAULT_THRESHOLD,
            explain_limit: DEFAULT_EXPLAIN_LIMIT,
        }
    }
}

/// One scored element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub node: NodeId,
    pub score: Score,
    pub depth: usize,
    pub order: usize,
}

/// Outcome of one relocation search.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    /// Best candidate, present only when it reached the threshold.
    pub winner: Option<MatchCandidate>,
    /// Best-ranked candidates, winner first, whether or not they passed.
    pub ranked: Vec<MatchCandidate>,
    /// Size of the candidate set.
    pub considered: usize,
}

/// Elements worth scoring against `fp`, in document order.
pub fn candidate_set(doc: &Document, fp: &Fingerprint) -> Vec<NodeId> {
    let snippet = &fp.text_signature().snippet;
    let wanted = text::tokens(snippet);
    let elements = doc.elements();

    if wanted.is_empty() {
        return elements
            .iter()
            .copied()
            .filter(|&id| doc.element(id).is_some_and(|e| e.tag() == fp.tag()))
            .collect();
    }

    // children follow their parents in document order, so a reverse pass
    // sees every descendant before its ancestors
    let mut hit = vec![false; elements.len()];
    for (i, &id) in elements.iter().enumerate().rev() {
        let own = doc.text_segments(id).any(|seg| {
            text::normalize(seg)
                .split_whitespace()
                .any(|t| wanted.contains(t))
        });
        if own {
            hit[i] = true;
        }
        if hit[i] {
            if let Some(parent) = doc.parent(id).and_then(|p| doc.element(p)) {
                hit[parent.order()] = true;
            }
        }
    }

    elements
        .iter()
        .zip(hit)
        .filter_map(|(&id, h)| h.then_some(id))
        .collect()
}

/// Search `doc` for the element best matching `fp`.
pub fn relocate(
    doc: &Document,
    fp: &Fingerprint,
    extractor: &Extractor,
    params: &RelocateParams,
    budget: &Budget,
) -> Result<Relocation> {
    budget.check()?;

    let candidates = candidate_set(doc, fp);
    let considered = candidates.len();

    let mut scored: Vec<MatchCandidate> = candidates
        .par_iter()
        .map(|&id| {
            budget.check()?;
            let features = extractor.features(doc, id)?;
            Ok(MatchCandidate {
                node: id,
                score: score(fp, &features, &params.weights),
                depth: features.depth,
                order: features.order,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    budget.check()?;

    let target_depth = fp.depth();
    scored.sort_by(|a, b| rank(a, b, target_depth));

    let winner = scored
        .first()
        .copied()
        .filter(|c| c.score.total >= params.threshold);
    scored.truncate(params.explain_limit.max(1));

    match (&winner, scored.first()) {
        (Some(w), _) => debug!(
            locator = fp.locator_key(),
            considered,
            node = w.node,
            score = w.score.total,
            "relocated element"
        ),
        (None, Some(best)) => debug!(
            locator = fp.locator_key(),
            considered,
            best = best.score.total,
            threshold = params.threshold,
            "best candidate below threshold"
        ),
        (None, None) => debug!(locator = fp.locator_key(), "no candidates"),
    }

    Ok(Relocation {
        winner,
        ranked: scored,
        considered,
    })
}

fn rank(a: &MatchCandidate, b: &MatchCandidate, target_depth: usize) -> Ordering {
    b.score
        .total
        .total_cmp(&a.score.total)
        .then_with(|| {
            a.depth
                .abs_diff(target_depth)
                .cmp(&b.depth.abs_diff(target_depth))
        })
        .then_with(|| a.order.cmp(&b.order))
}
