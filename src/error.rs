//! Typed failure taxonomy.
//!
//! Every failure the core can produce surfaces as a distinct type so the
//! API layer can map it to a stable outward status: a client can tell
//! "retry won't help" (bad image, bad credential, bad name) from a
//! server-side storage fault. Nothing here is retried internally.

use thiserror::Error;

/// Detection model emitted a class label outside the configured catalog.
/// Treated as a data/configuration bug, not something to drop silently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("detection class '{0}' is not in the configured catalog")]
pub struct UnknownClassError(pub String);

/// Caller contract violation: severity grading is only defined for
/// non-negative totals.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("detection count {0} is negative")]
pub struct InvalidCountError(pub i64);

/// Record / credential store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure")]
    Database(#[from] rusqlite::Error),
    #[error("no record with id {0}")]
    MissingRecord(i64),
    #[error("credential token already issued")]
    DuplicateToken,
    #[error("corrupt stored value '{0}'")]
    CorruptValue(String),
    #[error("store handle poisoned")]
    Poisoned,
}

/// Ingestion failures, in pipeline-stage order. `Decode` aborts before any
/// persistence; `Storage` before any database write; `Persistence` may
/// leave an orphaned file or a partially-populated record behind, which is
/// accepted and observable rather than rolled back.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("image bytes could not be decoded")]
    Decode(#[source] image::ImageError),
    #[error("failed to store image file")]
    Storage(#[source] anyhow::Error),
    #[error("record write failed")]
    Persistence(#[source] StoreError),
    #[error("detection model failed")]
    Model(#[source] anyhow::Error),
    #[error(transparent)]
    UnknownClass(#[from] UnknownClassError),
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Client-facing rejection reasons from the access gate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential not recognized")]
    InvalidCredential,
    #[error("credential expired")]
    Expired,
}

/// Everything `AccessGate::authorize` can fail with. The `Auth` variants
/// are non-retryable client errors; the rest are server-side faults.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("credential store failure")]
    Store(#[source] StoreError),
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Credential issuance failures.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("validity period must be positive")]
    InvalidValidity,
    #[error("credential store failure")]
    Store(#[source] StoreError),
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Fetch-by-filename failures. Names that fail the allowlist are reported
/// as not found rather than leaking why they were rejected.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no stored file named '{0}'")]
    NotFound(String),
    #[error("failed to read stored file")]
    Io(#[source] std::io::Error),
}
