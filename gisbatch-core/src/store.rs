//! Collaborator traits for remote feature stores.
//!
//! The submitter and the append pipeline only see these traits. Implementers
//! block until the remote call completes; nothing in this crate schedules
//! work concurrently.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{EditBatch, EditResponse, Operation};

/// Errors surfaced by remote store calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The request could not reach the store.
    #[error("network error contacting {url}: {message}")]
    Network {
        /// Request URL.
        url: String,
        /// Transport error text.
        message: String,
    },
    /// The request exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Request URL.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The store answered with an HTTP error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error text.
        message: String,
    },
    /// The store processed the request and rejected it.
    #[error("store rejected request ({code}): {message}")]
    Service {
        /// Store error code.
        code: i64,
        /// Store error message.
        message: String,
    },
    /// The store's answer could not be decoded.
    #[error("failed to parse store response: {message}")]
    Parse {
        /// Decoder error text.
        message: String,
    },
}

/// Destination for batched edits.
pub trait EditSink {
    /// Apply `batch` as adds or updates.
    ///
    /// Implementations must not roll back the whole batch when individual
    /// records fail; per-record outcomes belong in the response.
    fn submit_edits(
        &self,
        batch: &EditBatch<'_>,
        operation: Operation,
        use_global_ids: bool,
    ) -> Result<EditResponse, StoreError>;
}

/// Object whose editor tracking can be switched on and off.
pub trait TrackingControl {
    /// Enable or disable editor tracking.
    fn set_tracking_enabled(&self, enabled: bool) -> Result<(), StoreError>;
}

/// Esri field type names reported in layer schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// `esriFieldTypeString`.
    #[serde(rename = "esriFieldTypeString")]
    String,
    /// `esriFieldTypeDate`.
    #[serde(rename = "esriFieldTypeDate")]
    Date,
    /// `esriFieldTypeGlobalID`.
    #[serde(rename = "esriFieldTypeGlobalID")]
    GlobalId,
    /// `esriFieldTypeOID`.
    #[serde(rename = "esriFieldTypeOID")]
    ObjectId,
    /// Any other type; values pass through unchanged.
    #[serde(other)]
    Other,
}

/// One field of a target layer or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDef {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Layer or table receiving appended records.
pub trait TargetLayer {
    /// Schema of the target.
    fn fields(&self) -> Result<Vec<FieldDef>, StoreError>;

    /// Subset of `global_ids` already present in the target.
    fn existing_global_ids(&self, global_ids: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Remove every record from the target.
    fn delete_all(&self) -> Result<(), StoreError>;
}

impl<T: EditSink + ?Sized> EditSink for &T {
    fn submit_edits(
        &self,
        batch: &EditBatch<'_>,
        operation: Operation,
        use_global_ids: bool,
    ) -> Result<EditResponse, StoreError> {
        (**self).submit_edits(batch, operation, use_global_ids)
    }
}

impl<T: TrackingControl + ?Sized> TrackingControl for &T {
    fn set_tracking_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        (**self).set_tracking_enabled(enabled)
    }
}

impl<T: TargetLayer + ?Sized> TargetLayer for &T {
    fn fields(&self) -> Result<Vec<FieldDef>, StoreError> {
        (**self).fields()
    }

    fn existing_global_ids(&self, global_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        (**self).existing_global_ids(global_ids)
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        (**self).delete_all()
    }
}
