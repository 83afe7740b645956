//! Appending source rows to a target layer or table.
//!
//! Rows are shaped against the target schema by [`RecordBuilder`], optionally
//! filtered against global ids already present in the target, and handed to
//! the [`EditSubmitter`] with client global ids preserved.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::record::{Attributes, EditRecord, Operation, SubmissionReport};
use crate::store::{EditSink, FieldDef, FieldType, StoreError, TargetLayer, TrackingControl};
use crate::submit::{DEFAULT_BATCH_SIZE, EditSubmitter};

/// Field carrying the store-assigned unique identifier.
pub const GLOBAL_ID_FIELD: &str = "globalid";

/// Audit and system-maintained fields never copied from a source row.
pub const SKIPPED_FIELDS: [&str; 11] = [
    "creationdate",
    "creator",
    "editdate",
    "editor",
    "created_user",
    "created_date",
    "last_edited_user",
    "last_edited_date",
    "SHAPE__Area",
    "SHAPE__Length",
    "objectid",
];

const NULL_MARKER: &str = "<Null>";

/// Whether the source carries geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    /// Feature layer; geometry is copied.
    #[default]
    #[serde(rename = "LAYERS")]
    Layers,
    /// Attribute-only table.
    #[serde(rename = "TABLES")]
    Tables,
}

/// A row read from a source dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    geometry: Option<Value>,
}

impl SourceRow {
    /// Row without geometry.
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

    /// Raw attribute values.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Raw geometry payload.
    #[must_use]
    pub const fn geometry(&self) -> Option<&Value> {
        self.geometry.as_ref()
    }
}

/// Shapes source rows into edit records for a given target schema.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    fields: Vec<FieldDef>,
    data_type: DataType,
}

impl RecordBuilder {
    /// Build against `schema`, dropping [`SKIPPED_FIELDS`].
    #[must_use]
    pub fn new(schema: Vec<FieldDef>, data_type: DataType) -> Self {
        let fields = schema
            .into_iter()
            .filter(|field| !is_skipped(&field.name))
            .collect();
        Self { fields, data_type }
    }

    /// Fields copied from source rows.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Convert `row` into an [`EditRecord`].
    ///
    /// Source fields missing from the schema are ignored, and null or
    /// placeholder values are left out so the target applies its defaults.
    #[must_use]
    pub fn build(&self, row: &SourceRow) -> EditRecord {
        let attributes: Attributes = self
            .fields
            .iter()
            .filter_map(|field| {
                let value = row.attributes.get(&field.name)?;
                normalise_value(field, value).map(|clean| (field.name.clone(), clean))
            })
            .collect();
        let record = EditRecord::new(attributes);
        match (self.data_type, row.geometry()) {
            (DataType::Layers, Some(geometry)) => record.with_geometry(geometry.clone()),
            _ => record,
        }
    }
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_FIELDS
        .iter()
        .any(|skipped| skipped.eq_ignore_ascii_case(name))
}

fn normalise_value(field: &FieldDef, value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(text) => normalise_text(field, text),
        other => Some(other.clone()),
    }
}

fn normalise_text(field: &FieldDef, text: &str) -> Option<Value> {
    if text.is_empty() || text.eq_ignore_ascii_case(NULL_MARKER) {
        return None;
    }
    match field.field_type {
        FieldType::Date => {
            let millis = parse_date_millis(text);
            if millis.is_none() {
                warn!("dropping unparseable date {text:?} for field {}", field.name);
            }
            millis.map(Value::from)
        }
        FieldType::String => {
            let cleaned = text.replace(NULL_MARKER, "");
            let trimmed = cleaned.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NULL_MARKER) {
                None
            } else {
                Some(Value::String(cleaned))
            }
        }
        _ => Some(Value::String(text.to_owned())),
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DD[ T]HH:MM:SS` timestamp
/// (read as UTC), or a bare date into epoch milliseconds.
#[must_use]
pub fn parse_date_millis(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Comparison key for global ids: braces stripped, upper-cased.
fn global_id_key(id: &str) -> String {
    id.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_ascii_uppercase()
}

/// Drop candidates whose global id already exists in `layer`.
///
/// Candidates without a global id are always kept.
///
/// # Errors
///
/// Returns the store error when the existence lookup fails.
pub fn suppress_duplicates<L>(
    layer: &L,
    candidates: Vec<EditRecord>,
) -> Result<Vec<EditRecord>, StoreError>
where
    L: TargetLayer + ?Sized,
{
    let ids: Vec<String> = candidates
        .iter()
        .filter_map(|record| record.global_id(GLOBAL_ID_FIELD).map(str::to_owned))
        .collect();
    if ids.is_empty() {
        return Ok(candidates);
    }

    let existing: HashSet<String> = layer
        .existing_global_ids(&ids)?
        .iter()
        .map(|id| global_id_key(id))
        .collect();
    info!("{} records already exist in target", existing.len());

    let fresh: Vec<EditRecord> = candidates
        .into_iter()
        .filter(|record| {
            record
                .global_id(GLOBAL_ID_FIELD)
                .is_none_or(|id| !existing.contains(&global_id_key(id)))
        })
        .collect();
    if fresh.is_empty() {
        info!("all records exist in the target; nothing to add");
    } else {
        info!("records to add: {}", fresh.len());
    }
    Ok(fresh)
}

/// Settings for one append task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOptions {
    /// Whether geometry is copied.
    pub data_type: DataType,
    /// Submit as adds or updates.
    pub operation: Operation,
    /// Rows per chunk and records per batch.
    pub batch_size: NonZeroUsize,
    /// Skip rows whose global id already exists in the target.
    pub check_for_existing: bool,
    /// Delete every target record first.
    pub truncate_first: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            data_type: DataType::default(),
            operation: Operation::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            check_for_existing: false,
            truncate_first: false,
        }
    }
}

/// What an append task did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    /// Rows read from the source.
    pub rows_read: usize,
    /// Rows dropped because their global id already existed.
    pub skipped_existing: usize,
    /// Submission outcome.
    pub report: SubmissionReport,
}

/// Errors that abort an append task.
///
/// Batch submission failures never surface here; they are logged and
/// reported in [`AppendSummary::report`].
#[derive(Debug, Error)]
pub enum AppendError {
    /// Deleting existing records failed.
    #[error("failed to truncate target")]
    Truncate {
        /// Store failure.
        source: StoreError,
    },
    /// Reading the target schema failed.
    #[error("failed to read target schema")]
    Schema {
        /// Store failure.
        source: StoreError,
    },
    /// Looking up existing global ids failed.
    #[error("failed to query existing global ids")]
    ExistingLookup {
        /// Store failure.
        source: StoreError,
    },
}

/// Append `rows` to `layer`.
///
/// Rows are handled one chunk of `batch_size` at a time: each chunk is built,
/// checked for existing global ids when asked, and submitted before the next
/// one is read. `tracking` is suspended around each chunk's submission when
/// the operation is [`Operation::Update`].
///
/// # Errors
///
/// Returns [`AppendError`] when truncation, schema lookup or the duplicate
/// check fails. Chunks submitted before a failed check stay submitted.
pub fn append_rows<L>(
    layer: &L,
    rows: &[SourceRow],
    options: &AppendOptions,
    tracking: Option<&dyn TrackingControl>,
) -> Result<AppendSummary, AppendError>
where
    L: EditSink + TargetLayer + ?Sized,
{
    if options.truncate_first {
        info!("deleting all records");
        layer
            .delete_all()
            .map_err(|source| AppendError::Truncate { source })?;
    }

    let schema = layer
        .fields()
        .map_err(|source| AppendError::Schema { source })?;
    let builder = RecordBuilder::new(schema, options.data_type);

    let mut submitter = EditSubmitter::new(options.operation)
        .with_batch_size(options.batch_size)
        .with_global_ids(true);
    if let Some(target) = tracking {
        submitter = submitter.with_tracking_target(target);
    }

    let mut summary = AppendSummary {
        rows_read: rows.len(),
        ..AppendSummary::default()
    };
    for (index, chunk) in rows.chunks(options.batch_size.get()).enumerate() {
        info!("preparing chunk {index} ({} rows)", chunk.len());
        let built: Vec<EditRecord> = chunk.iter().map(|row| builder.build(row)).collect();
        let records = if options.check_for_existing {
            suppress_duplicates(layer, built)
                .map_err(|source| AppendError::ExistingLookup { source })?
        } else {
            built
        };
        summary.skipped_existing += chunk.len().saturating_sub(records.len());
        summary.report.absorb(submitter.submit(layer, &records));
    }
    Ok(summary)
}
