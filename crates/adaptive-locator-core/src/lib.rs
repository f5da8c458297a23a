//! # Adaptive Locator Core
//!
//! Deterministic element relocation: when a saved locator stops matching
//! after a document changes shape, find the element that most plausibly is
//! "the same one" by comparing it against a stored fingerprint.
//!
//! This crate contains no filesystem I/O, markup parser, or CLI code. The
//! application crate supplies those through the [`store::FingerprintStore`]
//! and [`engine::LocatorResolver`] traits.
//!
//! | Module | Role |
//! |--------|------|
//! | [`dom`] | arena-backed element tree |
//! | [`fingerprint`] | persistable element description |
//! | [`score`] | weighted similarity between a fingerprint and an element |
//! | [`relocate`] | candidate search and winner selection |
//! | [`store`] | storage trait and in-memory store |
//! | [`engine`] | literal-then-adaptive orchestration |

pub mod dom;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod relocate;
pub mod score;
pub mod store;
pub mod text;

pub use engine::{
    Engine, LocateRequest, Located, LocatorResolver, MatchResult, Mode, Options, Overrides,
    Refresh,
};
pub use error::{CancelReason, Error, Result, StoreError};
