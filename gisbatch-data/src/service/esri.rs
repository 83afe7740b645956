//! Wire types for the feature service REST endpoints.
//!
//! Services answer most failures with HTTP 200 and an `{"error": {...}}`
//! body, so every payload goes through [`decode_response`] before it is
//! deserialised into its expected shape.

use gisbatch_core::{EditResponse, FieldDef, Operation, RecordOutcome, StoreError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Error object embedded in a failed response.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) code: i64,
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) details: Vec<String>,
}

impl ErrorBody {
    fn describe(self) -> String {
        if self.details.is_empty() {
            self.message
        } else {
            format!("{} ({})", self.message, self.details.join("; "))
        }
    }
}

/// Response of `applyEdits`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplyEditsResponse {
    #[serde(default)]
    pub(crate) add_results: Vec<RecordOutcome>,
    #[serde(default)]
    pub(crate) update_results: Vec<RecordOutcome>,
}

impl ApplyEditsResponse {
    /// Keep the result list matching `operation`.
    pub(crate) fn into_edit_response(self, operation: Operation) -> EditResponse {
        match operation {
            Operation::Add => EditResponse::new(self.add_results),
            Operation::Update => EditResponse::new(self.update_results),
        }
    }
}

/// Layer metadata from `GET {layer}?f=json`.
#[derive(Debug, Deserialize)]
pub(crate) struct LayerInfo {
    #[serde(default)]
    pub(crate) fields: Vec<FieldDef>,
}

/// Feature returned by `query`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryFeature {
    #[serde(default)]
    pub(crate) attributes: Map<String, Value>,
}

/// Response of `query`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) features: Vec<QueryFeature>,
}

/// Response of `deleteFeatures`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteResponse {
    #[serde(default)]
    pub(crate) delete_results: Vec<RecordOutcome>,
}

/// Service metadata from `GET {service}?f=json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceInfo {
    #[serde(default)]
    pub(crate) editor_tracking_info: Option<Map<String, Value>>,
}

/// Response of the admin `updateDefinition` operation.
#[derive(Debug, Deserialize)]
pub(crate) struct UpdateDefinitionResponse {
    #[serde(default)]
    pub(crate) success: bool,
}

/// Turn a raw JSON answer into `T`, mapping embedded errors to
/// [`StoreError::Service`].
pub(crate) fn decode_response<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    if let Some(error) = value.get("error") {
        let body: ErrorBody = serde_json::from_value(error.clone()).map_err(parse_error)?;
        return Err(StoreError::Service {
            code: body.code,
            message: body.describe(),
        });
    }
    serde_json::from_value(value).map_err(parse_error)
}

pub(crate) fn parse_error(err: serde_json::Error) -> StoreError {
    StoreError::Parse {
        message: err.to_string(),
    }
}

/// SQL `where` clause matching any of `global_ids`.
pub(crate) fn global_id_clause(field: &str, global_ids: &[String]) -> String {
    let quoted: Vec<String> = global_ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("{field} in ({})", quoted.join(", "))
}
