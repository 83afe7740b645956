//! Core types for batched edits against remote feature stores.
//!
//! The crate holds the [`EditSubmitter`], which splits edit records into
//! fixed-size batches and delivers them one at a time, the collaborator
//! traits a store has to implement, and the append pipeline that shapes
//! source rows for a target schema before submission.
//!
//! Everything here is synchronous; implementers of [`EditSink`] block until
//! the store answers.

#![forbid(unsafe_code)]

pub mod append;
pub mod record;
pub mod store;
pub mod submit;

#[doc(hidden)]
pub mod test_support;

pub use append::{
    AppendError, AppendOptions, AppendSummary, DataType, GLOBAL_ID_FIELD, RecordBuilder,
    SKIPPED_FIELDS, SourceRow, append_rows, suppress_duplicates,
};
pub use record::{
    Attributes, EditBatch, EditFailure, EditRecord, EditResponse, EditResult, Operation,
    RecordOutcome, SubmissionReport, TrackingState, batch_count, partition,
};
pub use store::{EditSink, FieldDef, FieldType, StoreError, TargetLayer, TrackingControl};
pub use submit::{DEFAULT_BATCH_SIZE, EditSubmitter};
