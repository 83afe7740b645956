//! Behavioural tests for [`EditSubmitter`].

use std::cell::RefCell;
use std::num::NonZeroUsize;

use gisbatch_core::test_support::{RecordingStore, numbered_records};
use gisbatch_core::{EditRecord, EditSubmitter, Operation, StoreError, SubmissionReport};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

/// Scenario state shared by every step.
#[derive(Debug, Default)]
struct SubmitterWorld {
    store: RecordingStore,
    records: RefCell<Vec<EditRecord>>,
    report: RefCell<Option<SubmissionReport>>,
}

#[fixture]
fn world() -> SubmitterWorld {
    SubmitterWorld::default()
}

fn network_error() -> StoreError {
    StoreError::Network {
        url: "http://portal.example/FeatureServer/0/applyEdits".to_owned(),
        message: "connection reset".to_owned(),
    }
}

fn size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("batch size must be non-zero")
}

// --- Given steps ---

#[given("a store that accepts every batch")]
fn store_accepts(#[from(world)] world: &SubmitterWorld) {
    assert_eq!(world.store.submission_calls(), 0);
}

#[given("a store that fails the second batch")]
fn store_fails_second(#[from(world)] world: &SubmitterWorld) {
    world.store.fail_call(1, network_error());
}

#[given("a store that fails every batch")]
fn store_fails_all(#[from(world)] world: &SubmitterWorld) {
    world.store.fail_all(network_error());
}

#[given("2500 candidate records")]
fn many_records(#[from(world)] world: &SubmitterWorld) {
    *world.records.borrow_mut() = numbered_records(2500);
}

#[given("3 candidate records")]
fn three_records(#[from(world)] world: &SubmitterWorld) {
    *world.records.borrow_mut() = numbered_records(3);
}

#[given("no candidate records")]
fn no_records(#[from(world)] world: &SubmitterWorld) {
    world.records.borrow_mut().clear();
}

// --- When steps ---

#[when("I submit the records as adds with batch size 1000")]
fn submit_adds_default(#[from(world)] world: &SubmitterWorld) {
    let records = world.records.borrow();
    let report = EditSubmitter::new(Operation::Add)
        .with_batch_size(size(1000))
        .submit(&world.store, &records);
    world.report.replace(Some(report));
}

#[when("I submit the records as adds with batch size 1")]
fn submit_adds_single(#[from(world)] world: &SubmitterWorld) {
    let records = world.records.borrow();
    let report = EditSubmitter::new(Operation::Add)
        .with_batch_size(size(1))
        .submit(&world.store, &records);
    world.report.replace(Some(report));
}

#[when("I submit the records as updates with tracking")]
fn submit_updates(#[from(world)] world: &SubmitterWorld) {
    let records = world.records.borrow();
    let report = EditSubmitter::new(Operation::Update)
        .with_tracking_target(&world.store)
        .submit(&world.store, &records);
    world.report.replace(Some(report));
}

// --- Then steps ---

#[then("batches of sizes 1000, 1000 and 500 are submitted in order")]
fn three_batches(#[from(world)] world: &SubmitterWorld) {
    assert_eq!(world.store.submitted_batch_sizes(), vec![1000, 1000, 500]);
    assert_eq!(world.store.submitted_records(), *world.records.borrow());
}

#[then("the store is never called")]
fn store_untouched(#[from(world)] world: &SubmitterWorld) {
    assert_eq!(world.store.events_summary(), "");
    let borrowed = world.report.borrow();
    let report = borrowed.as_ref().expect("report recorded");
    assert!(report.is_empty());
}

#[then("the first and third batches are submitted")]
fn first_and_third(#[from(world)] world: &SubmitterWorld) {
    let records = world.records.borrow();
    let expected: Vec<EditRecord> = records
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 1)
        .map(|(_, record)| record.clone())
        .collect();
    assert_eq!(world.store.submission_calls(), 3);
    assert_eq!(world.store.submitted_records(), expected);
    let borrowed = world.report.borrow();
    let report = borrowed.as_ref().expect("report recorded");
    assert_eq!(report.failed_batches, vec![1]);
}

#[then("editor tracking is disabled and then re-enabled")]
fn tracking_restored(#[from(world)] world: &SubmitterWorld) {
    assert_eq!(world.store.events_summary(), "T0 S T1");
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/edit_submitter.feature", name = $title)]
        fn $fn_name(#[from(world)] world: SubmitterWorld) {
            let _ = world;
        }
    };
}

register_scenario!(submitting_adds, "submitting adds in three ordered batches");
register_scenario!(empty_input, "skipping the store for an empty record list");
register_scenario!(failed_batch, "continuing after a failed batch");
register_scenario!(tracking_after_failure, "restoring tracking after a failed update");
