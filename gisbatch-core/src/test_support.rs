//! In-memory feature store used by unit and behaviour tests.
//!
//! [`RecordingStore`] implements every store trait, records each call in
//! order, and lets tests inject failures, panics, rejections and
//! pre-existing global ids.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use crate::append::{GLOBAL_ID_FIELD, SourceRow};
use crate::record::{
    Attributes, EditBatch, EditFailure, EditRecord, EditResponse, Operation, RecordOutcome,
};
use crate::store::{EditSink, FieldDef, FieldType, StoreError, TargetLayer, TrackingControl};

/// Attribute holding the position of records built by [`numbered_records`].
pub const SEQUENCE_FIELD: &str = "n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Tracking(bool),
    Submit,
    Query,
    Delete,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    calls: usize,
    next_object_id: i64,
    batches: Vec<Vec<EditRecord>>,
    operations: Vec<Operation>,
    global_id_flags: Vec<bool>,
    failures: HashMap<usize, StoreError>,
    fail_all: Option<StoreError>,
    panic_on: Option<usize>,
    tracking_error: Option<StoreError>,
    rejected: HashSet<i64>,
    fields: Vec<FieldDef>,
    existing: HashSet<String>,
    query_error: Option<StoreError>,
    query_failures: HashMap<usize, StoreError>,
    queries: Vec<Vec<String>>,
}

/// Store double that records every interaction.
#[derive(Debug, Default)]
pub struct RecordingStore {
    state: RefCell<State>,
}

impl RecordingStore {
    /// Store whose schema is `fields`.
    #[must_use]
    pub fn with_fields(fields: Vec<FieldDef>) -> Self {
        let store = Self::default();
        store.state.borrow_mut().fields = fields;
        store
    }

    /// Mark `global_ids` as already present in the target.
    pub fn add_existing<I, S>(&self, global_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .existing
            .extend(global_ids.into_iter().map(Into::into));
    }

    /// Fail the zero-based submission call `call` with `error`.
    pub fn fail_call(&self, call: usize, error: StoreError) {
        self.state.borrow_mut().failures.insert(call, error);
    }

    /// Fail every submission with `error`.
    pub fn fail_all(&self, error: StoreError) {
        self.state.borrow_mut().fail_all = Some(error);
    }

    /// Panic inside the zero-based submission call `call`.
    pub fn panic_on_call(&self, call: usize) {
        self.state.borrow_mut().panic_on = Some(call);
    }

    /// Fail every tracking toggle with `error`.
    pub fn fail_tracking(&self, error: StoreError) {
        self.state.borrow_mut().tracking_error = Some(error);
    }

    /// Fail global id lookups with `error`.
    pub fn fail_queries(&self, error: StoreError) {
        self.state.borrow_mut().query_error = Some(error);
    }

    /// Fail the zero-based global id lookup `call` with `error`.
    pub fn fail_query_call(&self, call: usize, error: StoreError) {
        self.state.borrow_mut().query_failures.insert(call, error);
    }

    /// Report records whose [`SEQUENCE_FIELD`] is in `sequence` as rejected.
    pub fn reject_records(&self, sequence: &[i64]) {
        self.state
            .borrow_mut()
            .rejected
            .extend(sequence.iter().copied());
    }

    /// Number of submission calls, successful or not.
    #[must_use]
    pub fn submission_calls(&self) -> usize {
        self.state.borrow().calls
    }

    /// Sizes of the batches the store accepted, in order.
    #[must_use]
    pub fn submitted_batch_sizes(&self) -> Vec<usize> {
        self.state.borrow().batches.iter().map(Vec::len).collect()
    }

    /// Records from accepted batches, flattened in order.
    #[must_use]
    pub fn submitted_records(&self) -> Vec<EditRecord> {
        self.state.borrow().batches.concat()
    }

    /// Global ids of accepted records, in order.
    #[must_use]
    pub fn submitted_global_ids(&self) -> Vec<String> {
        self.submitted_records()
            .iter()
            .filter_map(|record| record.global_id(GLOBAL_ID_FIELD).map(str::to_owned))
            .collect()
    }

    /// Operation used by every submission call.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().operations.clone()
    }

    /// `use_global_ids` flag passed with every submission call.
    #[must_use]
    pub fn global_id_flags(&self) -> Vec<bool> {
        self.state.borrow().global_id_flags.clone()
    }

    /// Values passed to `set_tracking_enabled`, in order.
    #[must_use]
    pub fn tracking_calls(&self) -> Vec<bool> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Tracking(enabled) => Some(*enabled),
                _ => None,
            })
            .collect()
    }

    /// Global id lists passed to `existing_global_ids`.
    #[must_use]
    pub fn queries(&self) -> Vec<Vec<String>> {
        self.state.borrow().queries.clone()
    }

    /// Compact event log: `T0`/`T1` tracking off/on, `S` submit, `Q` query,
    /// `D` delete.
    #[must_use]
    pub fn events_summary(&self) -> String {
        self.state
            .borrow()
            .events
            .iter()
            .map(|event| match event {
                Event::Tracking(false) => "T0",
                Event::Tracking(true) => "T1",
                Event::Submit => "S",
                Event::Query => "Q",
                Event::Delete => "D",
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl EditSink for RecordingStore {
    fn submit_edits(
        &self,
        batch: &EditBatch<'_>,
        operation: Operation,
        use_global_ids: bool,
    ) -> Result<EditResponse, StoreError> {
        let mut state = self.state.borrow_mut();
        let call = state.calls;
        state.calls += 1;
        state.events.push(Event::Submit);
        state.operations.push(operation);
        state.global_id_flags.push(use_global_ids);

        if state.panic_on == Some(call) {
            drop(state);
            panic!("injected panic on submission {call}");
        }
        let injected = state.failures.remove(&call);
        if let Some(error) = injected.or_else(|| state.fail_all.clone()) {
            return Err(error);
        }

        let mut results = Vec::with_capacity(batch.len());
        for record in batch.records() {
            state.next_object_id += 1;
            let sequence = record
                .attributes()
                .get(SEQUENCE_FIELD)
                .and_then(Value::as_i64);
            let success = sequence.is_none_or(|n| !state.rejected.contains(&n));
            results.push(RecordOutcome {
                object_id: Some(state.next_object_id),
                global_id: record.global_id(GLOBAL_ID_FIELD).map(str::to_owned),
                success,
                error: (!success).then(|| EditFailure {
                    code: 1000,
                    description: "rejected by recording store".to_owned(),
                }),
            });
        }
        state.batches.push(batch.records().to_vec());
        Ok(EditResponse::new(results))
    }
}

impl TrackingControl for RecordingStore {
    fn set_tracking_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::Tracking(enabled));
        state.tracking_error.clone().map_or(Ok(()), Err)
    }
}

impl TargetLayer for RecordingStore {
    fn fields(&self) -> Result<Vec<FieldDef>, StoreError> {
        Ok(self.state.borrow().fields.clone())
    }

    fn existing_global_ids(&self, global_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut state = self.state.borrow_mut();
        let call = state.queries.len();
        state.events.push(Event::Query);
        state.queries.push(global_ids.to_vec());
        let injected = state.query_failures.remove(&call);
        if let Some(error) = injected.or_else(|| state.query_error.clone()) {
            return Err(error);
        }
        // Matches the way feature services compare GUIDs: case-insensitive,
        // braces optional, answered in the stored form.
        let requested: HashSet<String> = global_ids.iter().map(|id| guid_key(id)).collect();
        Ok(state
            .existing
            .iter()
            .filter(|id| requested.contains(&guid_key(id)))
            .cloned()
            .collect())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::Delete);
        state.batches.clear();
        Ok(())
    }
}

fn guid_key(id: &str) -> String {
    id.trim_matches(|c| c == '{' || c == '}').to_ascii_lowercase()
}

/// `count` records carrying a [`SEQUENCE_FIELD`] and a `{G<i>}` global id.
#[must_use]
pub fn numbered_records(count: usize) -> Vec<EditRecord> {
    (0..count)
        .map(|i| {
            let mut attributes = Attributes::new();
            attributes.insert(SEQUENCE_FIELD.to_owned(), json!(i));
            attributes.insert(GLOBAL_ID_FIELD.to_owned(), json!(format!("{{G{i}}}")));
            EditRecord::new(attributes)
        })
        .collect()
}

/// Source row with a global id and a name.
#[must_use]
pub fn named_row(global_id: &str, name: &str) -> SourceRow {
    let mut attributes = Attributes::new();
    attributes.insert(GLOBAL_ID_FIELD.to_owned(), json!(global_id));
    attributes.insert("name".to_owned(), json!(name));
    SourceRow::new(attributes)
}

/// Schema with a global id and a string `name` field.
#[must_use]
pub fn named_schema() -> Vec<FieldDef> {
    vec![
        FieldDef::new("objectid", FieldType::ObjectId),
        FieldDef::new(GLOBAL_ID_FIELD, FieldType::GlobalId),
        FieldDef::new("name", FieldType::String),
    ]
}
