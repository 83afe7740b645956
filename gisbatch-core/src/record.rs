//! Edit records, the batches they travel in, and per-batch outcomes.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute map keyed by field name.
pub type Attributes = Map<String, Value>;

/// A single logical edit destined for a remote feature store.
///
/// Records serialise to the `{"attributes": {...}, "geometry": {...}}` shape
/// accepted by feature service edit endpoints. The geometry payload is
/// opaque and passed through untouched.
///
/// # Examples
///
/// ```
/// use gisbatch_core::{Attributes, EditRecord};
/// use serde_json::json;
///
/// let mut attributes = Attributes::new();
/// attributes.insert("globalid".into(), json!("{A}"));
/// let record = EditRecord::new(attributes).with_geometry(json!({"x": 1.0, "y": 2.0}));
/// assert_eq!(record.global_id("globalid"), Some("{A}"));
/// assert!(record.geometry().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geometry: Option<Value>,
}

impl EditRecord {
    /// Build a record without geometry.
    #[must_use]
    pub const fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    /// Attach a geometry payload.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Field values carried by the record.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Geometry payload, if any.
    #[must_use]
    pub const fn geometry(&self) -> Option<&Value> {
        self.geometry.as_ref()
    }

    /// Return the string value stored under `field`, if present.
    #[must_use]
    pub fn global_id(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }
}

/// Kind of edit applied to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert new records.
    #[default]
    Add,
    /// Modify existing records identified by object or global id.
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// Editor tracking configuration on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Audit fields are stamped on every edit.
    Enabled,
    /// Audit fields are left untouched.
    Disabled,
}

impl TrackingState {
    /// Whether tracking is on.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl From<bool> for TrackingState {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

/// A contiguous, order-preserving slice of the records being submitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditBatch<'a> {
    index: usize,
    records: &'a [EditRecord],
}

impl<'a> EditBatch<'a> {
    /// Zero-based position of the batch within its run.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Records in submission order.
    #[must_use]
    pub const fn records(&self) -> &'a [EditRecord] {
        self.records
    }

    /// Number of records in the batch.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split `records` into contiguous batches of at most `batch_size`.
///
/// Concatenating the yielded batches in order reproduces `records`.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use gisbatch_core::{Attributes, EditRecord, partition};
///
/// let records = vec![EditRecord::new(Attributes::new()); 5];
/// let size = NonZeroUsize::new(2).expect("non-zero");
/// let lengths: Vec<_> = partition(&records, size).map(|batch| batch.len()).collect();
/// assert_eq!(lengths, vec![2, 2, 1]);
/// ```
pub fn partition(
    records: &[EditRecord],
    batch_size: NonZeroUsize,
) -> impl ExactSizeIterator<Item = EditBatch<'_>> {
    records
        .chunks(batch_size.get())
        .enumerate()
        .map(|(index, records)| EditBatch { index, records })
}

/// Number of batches `partition` yields for `len` records.
#[must_use]
pub const fn batch_count(len: usize, batch_size: NonZeroUsize) -> usize {
    len.div_ceil(batch_size.get())
}

/// Failure detail attached to a rejected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFailure {
    /// Store-specific error code.
    pub code: i64,
    /// Human-readable reason.
    #[serde(default)]
    pub description: String,
}

/// Outcome the store reported for one record in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Object id assigned or matched by the store.
    #[serde(default)]
    pub object_id: Option<i64>,
    /// Global id assigned or matched by the store.
    #[serde(default)]
    pub global_id: Option<String>,
    /// Whether the record was applied.
    pub success: bool,
    /// Reason for a rejection.
    #[serde(default)]
    pub error: Option<EditFailure>,
}

/// Per-record results returned by a single edit submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditResponse {
    /// One entry per record the store processed.
    pub results: Vec<RecordOutcome>,
}

impl EditResponse {
    /// Wrap per-record outcomes.
    #[must_use]
    pub const fn new(results: Vec<RecordOutcome>) -> Self {
        Self { results }
    }

    /// Count of records the store applied.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|outcome| outcome.success).count()
    }

    /// Records the store rejected.
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.results.iter().filter(|outcome| !outcome.success)
    }
}

/// Attempted versus successful counts for one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditResult {
    /// Batch position within the run.
    pub batch: usize,
    /// Records sent.
    pub attempted: usize,
    /// Records the store reported as applied.
    pub succeeded: usize,
    /// Per-record outcomes the store returned; zero when none were reported.
    pub reported: usize,
}

/// Summary of a submission run.
///
/// Failures are never escalated; the report only tells the caller what the
/// log already says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Results for batches the store answered.
    pub results: Vec<EditResult>,
    /// Indices of batches whose submission errored.
    pub failed_batches: Vec<usize>,
}

impl SubmissionReport {
    /// Number of batches sent to the store.
    #[must_use]
    pub fn batches_attempted(&self) -> usize {
        self.results.len() + self.failed_batches.len()
    }

    /// Records sent in batches the store answered.
    #[must_use]
    pub fn total_attempted(&self) -> usize {
        self.results.iter().map(|result| result.attempted).sum()
    }

    /// Records the store reported as applied.
    #[must_use]
    pub fn total_succeeded(&self) -> usize {
        self.results.iter().map(|result| result.succeeded).sum()
    }

    /// Whether nothing was sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches_attempted() == 0
    }

    /// Append `later`, renumbering its batches to follow this report's.
    pub fn absorb(&mut self, later: Self) {
        let offset = self.batches_attempted();
        self.results
            .extend(later.results.into_iter().map(|result| EditResult {
                batch: result.batch + offset,
                ..result
            }));
        self.failed_batches
            .extend(later.failed_batches.into_iter().map(|index| index + offset));
    }
}
