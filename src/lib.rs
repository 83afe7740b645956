//! Facade crate for gisbatch.
//!
//! This crate re-exports the batched edit submitter, the append pipeline and
//! the store traits, and exposes the feature service adapter behind the
//! `http` feature flag.

#![forbid(unsafe_code)]

pub use gisbatch_core::{
    AppendError, AppendOptions, AppendSummary, DEFAULT_BATCH_SIZE, DataType, EditBatch,
    EditRecord, EditResponse, EditResult, EditSink, EditSubmitter, FieldDef, FieldType,
    Operation, RecordOutcome, SourceRow, StoreError, SubmissionReport, TargetLayer,
    TrackingControl, append_rows,
};

#[cfg(feature = "http")]
pub use gisbatch_data::{
    FeatureLayer, FeatureService, PortalClient, PortalClientConfig, load_feature_set,
};
