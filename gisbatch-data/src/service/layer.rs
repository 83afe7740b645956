//! Feature layer and feature service handles backed by [`PortalClient`].

use std::collections::HashSet;

use gisbatch_core::{
    EditBatch, EditResponse, EditSink, FieldDef, GLOBAL_ID_FIELD, Operation, StoreError,
    TargetLayer, TrackingControl,
};
use log::{debug, info, warn};
use serde_json::{Map, Value, json};
use url::Url;

use super::client::PortalClient;
use super::esri::{
    ApplyEditsResponse, DeleteResponse, LayerInfo, QueryFeature, QueryResponse, ServiceInfo,
    UpdateDefinitionResponse, global_id_clause, parse_error,
};
use super::urls::{admin_url, join_segment, service_url_for_layer};

const TRUNCATE_WHERE: &str = "objectid > 0";
const TRACKING_FLAG: &str = "enableEditorTracking";

/// A layer or table addressed by its REST URL.
#[derive(Debug, Clone)]
pub struct FeatureLayer<'a> {
    client: &'a PortalClient,
    url: Url,
}

impl<'a> FeatureLayer<'a> {
    pub(crate) const fn new(client: &'a PortalClient, url: Url) -> Self {
        Self { client, url }
    }

    /// Layer URL without query or trailing slash.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Service owning this layer, derived by dropping the layer index.
    ///
    /// Returns `None` when the URL does not end in a layer index or does not
    /// sit under `/rest/services/`.
    #[must_use]
    pub fn owning_service(&self) -> Option<FeatureService<'a>> {
        let service = service_url_for_layer(&self.url)?;
        let admin = admin_url(&service).ok()?;
        Some(FeatureService::new(self.client, service, admin))
    }
}

impl EditSink for FeatureLayer<'_> {
    fn submit_edits(
        &self,
        batch: &EditBatch<'_>,
        operation: Operation,
        use_global_ids: bool,
    ) -> Result<EditResponse, StoreError> {
        let params = apply_edits_params(batch, operation, use_global_ids)?;
        debug!(
            "applyEdits {operation} of {} records to {}",
            batch.len(),
            self.url
        );
        let response: ApplyEditsResponse = self
            .client
            .post_form(&join_segment(&self.url, "applyEdits"), params)?;
        Ok(response.into_edit_response(operation))
    }
}

impl TargetLayer for FeatureLayer<'_> {
    fn fields(&self) -> Result<Vec<FieldDef>, StoreError> {
        let info: LayerInfo = self.client.get_json(&self.url)?;
        Ok(info.fields)
    }

    fn existing_global_ids(&self, global_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if global_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let params = vec![
            ("where", global_id_clause(GLOBAL_ID_FIELD, global_ids)),
            ("outFields", GLOBAL_ID_FIELD.to_owned()),
            ("returnGeometry", "false".to_owned()),
        ];
        let response: QueryResponse = self
            .client
            .post_form(&join_segment(&self.url, "query"), params)?;
        Ok(collect_global_ids(&response.features))
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let params = vec![("where", TRUNCATE_WHERE.to_owned())];
        let response: DeleteResponse = self
            .client
            .post_form(&join_segment(&self.url, "deleteFeatures"), params)?;
        let rejected = response
            .delete_results
            .iter()
            .filter(|outcome| !outcome.success)
            .count();
        if rejected > 0 {
            warn!(
                "{rejected} of {} deletes were rejected by {}",
                response.delete_results.len(),
                self.url
            );
        }
        info!(
            "deleted {} records from {}",
            response.delete_results.len() - rejected,
            self.url
        );
        Ok(())
    }
}

/// A feature service whose definition can be updated through its admin URL.
#[derive(Debug, Clone)]
pub struct FeatureService<'a> {
    client: &'a PortalClient,
    url: Url,
    admin: Url,
}

impl<'a> FeatureService<'a> {
    pub(crate) const fn new(client: &'a PortalClient, url: Url, admin: Url) -> Self {
        Self { client, url, admin }
    }

    /// Public REST URL of the service.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Admin URL used for definition updates.
    #[must_use]
    pub const fn admin_url(&self) -> &Url {
        &self.admin
    }
}

impl TrackingControl for FeatureService<'_> {
    fn set_tracking_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let info: ServiceInfo = self.client.get_json(&self.url)?;
        let definition = tracking_definition(info.editor_tracking_info, enabled);
        let params = vec![
            (
                "updateDefinition",
                serde_json::to_string(&definition).map_err(parse_error)?,
            ),
            ("async", "false".to_owned()),
        ];
        let response: UpdateDefinitionResponse = self
            .client
            .post_form(&join_segment(&self.admin, "updateDefinition"), params)?;
        if !response.success {
            return Err(StoreError::Service {
                code: 0,
                message: format!("updateDefinition on {} reported failure", self.admin),
            });
        }
        info!(
            "editor tracking {} on {}",
            if enabled { "enabled" } else { "disabled" },
            self.url
        );
        Ok(())
    }
}

/// Form fields for an `applyEdits` call.
fn apply_edits_params(
    batch: &EditBatch<'_>,
    operation: Operation,
    use_global_ids: bool,
) -> Result<Vec<(&'static str, String)>, StoreError> {
    let key = match operation {
        Operation::Add => "adds",
        Operation::Update => "updates",
    };
    let payload = serde_json::to_string(batch.records()).map_err(parse_error)?;
    Ok(vec![
        (key, payload),
        ("useGlobalIds", use_global_ids.to_string()),
        ("rollbackOnFailure", "false".to_owned()),
    ])
}

/// Global ids in a query answer. Services differ in the case they report
/// the field name in.
fn collect_global_ids(features: &[QueryFeature]) -> HashSet<String> {
    features
        .iter()
        .filter_map(|feature| {
            feature
                .attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(GLOBAL_ID_FIELD))
                .and_then(|(_, value)| value.as_str())
                .map(str::to_owned)
        })
        .collect()
}

/// Service definition fragment toggling editor tracking, keeping any other
/// tracking settings the service already reports.
fn tracking_definition(current: Option<Map<String, Value>>, enabled: bool) -> Value {
    let mut tracking = current.unwrap_or_default();
    tracking.insert(TRACKING_FLAG.to_owned(), Value::Bool(enabled));
    json!({ "editorTrackingInfo": tracking })
}
