use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Absence is never an error: an empty literal result, an empty store, and
/// a failed relocation are all reported through
/// [`MatchResult`](crate::engine::MatchResult).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Node {0} is not an element of this document")]
    DetachedElement(usize),

    #[error("No domain key: pass one explicitly or parse the document with a URL")]
    MissingDomain,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(CancelReason),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a relocation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller tripped its [`CancelToken`](crate::relocate::CancelToken).
    Requested,
    /// The configured time budget ran out.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancelled by caller"),
            CancelReason::DeadlineExceeded => write!(f, "time budget exceeded"),
        }
    }
}

/// Fingerprint store write failures.
///
/// Read-side faults never produce a `StoreError`: corrupt or missing
/// records degrade to an empty mapping.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode records for domain '{domain}': {source}")]
    Encode {
        domain: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Fingerprint belongs to domain '{fingerprint}', refusing to save under '{target}'")]
    DomainMismatch { fingerprint: String, target: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
