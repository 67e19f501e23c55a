//! wastewatch - field-device waste photo ingestion service
//!
//! Field devices upload photographs of public spaces; the service runs an
//! object-detection model over each image, reduces the detections to
//! per-class counts, grades the total into a three-tier severity level and
//! keeps both the original and the annotated raster queryable behind a
//! bearer-credential gate.
//!
//! # Module Structure
//!
//! - `detect`: detection model boundary (trait + scripted stub backend)
//! - `catalog` / `count` / `severity`: class catalog, count reduction, grading
//! - `annotate`: box/label drawing on a copy of the source raster
//! - `pipeline`: the decode -> store -> detect -> grade -> annotate sequence
//! - `media` / `storage`: filesystem roots and the SQLite record store
//! - `auth`: credential issuance and the access gate for read endpoints
//! - `api`: minimal HTTP surface for uploads and queries

use anyhow::Result;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod annotate;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod count;
pub mod detect;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod severity;
pub mod storage;

pub use annotate::Annotator;
pub use auth::{AccessGate, CredentialIssuer, DEFAULT_TOKEN_VALIDITY};
pub use catalog::ClassCatalog;
pub use count::{count_classes, ClassCountTable};
pub use detect::{BoundingBox, Detection, DetectionModel, StubModel};
pub use error::{
    AuthError, FetchError, GateError, IngestError, InvalidCountError, IssueError, StoreError,
    UnknownClassError,
};
pub use media::MediaStore;
pub use pipeline::{IngestionPipeline, IngestionResult};
pub use severity::SeverityLevel;
pub use storage::{
    CredentialStore, DetectionUpdate, InMemoryStore, NewImageRecord, RecordStore, SqliteStore,
};

// -------------------- Time --------------------

/// Fixed civil zone used at the presentation boundary (Asia/Jakarta, UTC+7,
/// no DST). All persisted timestamps are epoch milliseconds; conversion to
/// this zone happens only when rendering API payloads.
pub const CIVIL_ZONE_NAME: &str = "Asia/Jakarta";
const CIVIL_ZONE_OFFSET_SECS: i32 = 7 * 3600;

pub fn civil_zone() -> FixedOffset {
    static ZONE: OnceLock<FixedOffset> = OnceLock::new();
    *ZONE.get_or_init(|| FixedOffset::east_opt(CIVIL_ZONE_OFFSET_SECS).unwrap())
}

pub fn now_ms() -> Result<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(i64::try_from(elapsed.as_millis())?)
}

/// Renders an epoch-millisecond instant as RFC 3339 in the civil zone,
/// e.g. `2026-08-28T14:03:07+07:00`. `None` for out-of-range instants.
pub fn format_civil(epoch_ms: i64) -> Option<String> {
    let utc = DateTime::from_timestamp_millis(epoch_ms)?;
    Some(
        utc.with_timezone(&civil_zone())
            .to_rfc3339_opts(SecondsFormat::Secs, false),
    )
}

// -------------------- Identifiers --------------------

/// Random 128-bit identifier rendered as 32 hex characters. Used for stored
/// filenames and credential tokens; collision probability is negligible, so
/// concurrent uploads never contend for a name.
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// -------------------- Input Discipline --------------------

/// Stored filenames are generated by this crate; anything a client presents
/// for fetching must match the same shape. Positive allowlist, no path
/// separators.
pub fn is_valid_stored_filename(name: &str) -> bool {
    static FILENAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = FILENAME_RE
        .get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,80}\.(jpg|jpeg|png)$").unwrap());
    re.is_match(name)
}

/// Device ids are opaque caller-supplied strings, but they end up in log
/// lines and database rows, so the shape is restricted.
pub fn is_valid_device_id(device_id: &str) -> bool {
    static DEVICE_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_ID_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9:._-]{1,64}$").unwrap());
    re.is_match(device_id)
}

// -------------------- Records --------------------

/// One uploaded image and its derived detection metadata.
///
/// Created with only the upload-time fields; the detection fields stay
/// `None` until the pipeline's single follow-up update. A record whose
/// detection fields are still `None` marks an ingestion that failed after
/// the initial insert, which is deliberately observable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageRecord {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub device_id: String,
    pub uploaded_at_ms: i64,
    pub labeled_filename: Option<String>,
    pub labeled_filepath: Option<String>,
    pub total_count: Option<i64>,
    pub severity: Option<SeverityLevel>,
}

impl ImageRecord {
    /// Presentation projection: timestamps rendered in the civil zone.
    pub fn view(&self) -> ImageRecordView {
        ImageRecordView {
            id: self.id,
            filename: self.filename.clone(),
            filepath: self.filepath.clone(),
            device_id: self.device_id.clone(),
            uploaded_at: format_civil(self.uploaded_at_ms).unwrap_or_default(),
            labeled_filename: self.labeled_filename.clone(),
            labeled_filepath: self.labeled_filepath.clone(),
            total_count: self.total_count,
            severity: self.severity,
        }
    }
}

/// API projection of [`ImageRecord`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRecordView {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub device_id: String,
    pub uploaded_at: String,
    pub labeled_filename: Option<String>,
    pub labeled_filepath: Option<String>,
    pub total_count: Option<i64>,
    pub severity: Option<SeverityLevel>,
}

// -------------------- Credentials --------------------

/// Bearer credential gating the read endpoints. Immutable once issued;
/// expiry is evaluated against `expires_at_ms`, never by mutation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Credential {
    /// Closed boundary: a credential whose expiry equals "now" is expired.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}
