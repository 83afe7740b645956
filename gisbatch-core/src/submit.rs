//! Batched edit submission.
//!
//! [`EditSubmitter`] splits a list of [`EditRecord`]s into fixed-size
//! batches and hands each one to an [`EditSink`] in order. A failing batch is
//! logged and skipped; the run always continues with the next batch and
//! nothing is retried or rolled back. Update runs may suspend editor
//! tracking on a [`TrackingControl`] target for their duration; tracking is
//! switched back on by a drop guard, so it is restored after the last batch,
//! on early return, and while unwinding from a panic.

use std::num::NonZeroUsize;

use log::{info, warn};

use crate::record::{EditRecord, EditResult, Operation, SubmissionReport, batch_count, partition};
use crate::store::{EditSink, TrackingControl};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// Configurable batched submission pipeline.
///
/// # Examples
///
/// ```
/// use gisbatch_core::test_support::RecordingStore;
/// use gisbatch_core::{Attributes, EditRecord, EditSubmitter, Operation};
///
/// let store = RecordingStore::default();
/// let records = vec![EditRecord::new(Attributes::new()); 3];
/// let report = EditSubmitter::new(Operation::Add).submit(&store, &records);
/// assert_eq!(report.total_attempted(), 3);
/// assert_eq!(store.submitted_batch_sizes(), vec![3]);
/// ```
#[derive(Clone, Copy)]
pub struct EditSubmitter<'a> {
    operation: Operation,
    batch_size: NonZeroUsize,
    use_global_ids: bool,
    tracking: Option<&'a dyn TrackingControl>,
}

impl std::fmt::Debug for EditSubmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSubmitter")
            .field("operation", &self.operation)
            .field("batch_size", &self.batch_size)
            .field("use_global_ids", &self.use_global_ids)
            .field("tracking", &self.tracking.map(|_| "<TrackingControl>"))
            .finish()
    }
}

impl<'a> EditSubmitter<'a> {
    /// Create a submitter for `operation` with the default batch size.
    #[must_use]
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            batch_size: DEFAULT_BATCH_SIZE,
            use_global_ids: false,
            tracking: None,
        }
    }

    /// Set the maximum number of records per batch.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Ask the store to honour client-supplied global ids.
    #[must_use]
    pub const fn with_global_ids(mut self, use_global_ids: bool) -> Self {
        self.use_global_ids = use_global_ids;
        self
    }

    /// Suspend editor tracking on `target` while updates run.
    ///
    /// Ignored for [`Operation::Add`].
    #[must_use]
    pub const fn with_tracking_target(mut self, target: &'a dyn TrackingControl) -> Self {
        self.tracking = Some(target);
        self
    }

    /// Operation applied to every batch.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Maximum records per batch.
    #[must_use]
    pub const fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Run `produce` and submit whatever records it returns.
    pub fn submit_with<S, F>(&self, sink: &S, produce: F) -> SubmissionReport
    where
        S: EditSink + ?Sized,
        F: FnOnce() -> Vec<EditRecord>,
    {
        let records = produce();
        self.submit(sink, &records)
    }

    /// Submit `records` to `sink` in order, one batch at a time.
    pub fn submit<S>(&self, sink: &S, records: &[EditRecord]) -> SubmissionReport
    where
        S: EditSink + ?Sized,
    {
        let mut report = SubmissionReport::default();
        if records.is_empty() {
            info!("record list was empty; no edits performed");
            return report;
        }

        info!(
            "processing {} {} batches",
            batch_count(records.len(), self.batch_size),
            self.operation
        );
        let _suspension = self.suspend_tracking();

        for batch in partition(records, self.batch_size) {
            match sink.submit_edits(&batch, self.operation, self.use_global_ids) {
                Ok(response) => {
                    let result = EditResult {
                        batch: batch.index(),
                        attempted: batch.len(),
                        succeeded: response.succeeded(),
                        reported: response.results.len(),
                    };
                    if result.reported == 0 {
                        info!(
                            "batch {}: store reported no per-record results: {response:?}",
                            batch.index()
                        );
                    } else {
                        info!(
                            "batch {}: edit results: {} of {} succeeded",
                            batch.index(),
                            result.succeeded,
                            result.attempted
                        );
                    }
                    report.results.push(result);
                }
                Err(err) => {
                    warn!("batch {} of {} records failed: {err}", batch.index(), batch.len());
                    report.failed_batches.push(batch.index());
                }
            }
        }
        report
    }

    fn suspend_tracking(&self) -> Option<TrackingSuspension<'a>> {
        match (self.operation, self.tracking) {
            (Operation::Update, Some(target)) => Some(TrackingSuspension::begin(target)),
            _ => None,
        }
    }
}

/// Disables tracking on creation and re-enables it on drop.
struct TrackingSuspension<'a> {
    target: &'a dyn TrackingControl,
}

impl<'a> TrackingSuspension<'a> {
    fn begin(target: &'a dyn TrackingControl) -> Self {
        match target.set_tracking_enabled(false) {
            Ok(()) => info!("disabled editor tracking"),
            Err(err) => warn!("failed to disable editor tracking: {err}"),
        }
        Self { target }
    }
}

impl Drop for TrackingSuspension<'_> {
    fn drop(&mut self) {
        match self.target.set_tracking_enabled(true) {
            Ok(()) => info!("re-enabled editor tracking"),
            Err(err) => warn!("failed to re-enable editor tracking: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::test_support::{RecordingStore, numbered_records};
    use rstest::{fixture, rstest};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[fixture]
    fn store() -> RecordingStore {
        RecordingStore::default()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("batch size must be non-zero")
    }

    #[rstest]
    fn default_batch_size_is_one_thousand() {
        assert_eq!(DEFAULT_BATCH_SIZE.get(), 1000);
        assert_eq!(EditSubmitter::new(Operation::Add).batch_size().get(), 1000);
    }

    #[rstest]
    fn empty_input_makes_no_remote_calls(store: RecordingStore) {
        let report = EditSubmitter::new(Operation::Update)
            .with_tracking_target(&store)
            .submit(&store, &[]);

        assert!(report.is_empty());
        assert_eq!(store.submission_calls(), 0);
        assert!(store.tracking_calls().is_empty());
    }

    #[rstest]
    fn add_splits_into_ordered_batches(store: RecordingStore) {
        let records = numbered_records(2500);
        let report = EditSubmitter::new(Operation::Add).submit(&store, &records);

        assert_eq!(store.submitted_batch_sizes(), vec![1000, 1000, 500]);
        assert_eq!(store.submitted_records(), records);
        assert_eq!(report.total_attempted(), 2500);
        assert_eq!(report.total_succeeded(), 2500);
        assert!(store.operations().iter().all(|op| *op == Operation::Add));
    }

    #[rstest]
    fn failing_batch_does_not_stop_later_batches(store: RecordingStore) {
        store.fail_call(1, StoreError::Network {
            url: "http://portal.example/applyEdits".into(),
            message: "connection reset".into(),
        });
        let records = numbered_records(3);
        let report = EditSubmitter::new(Operation::Add)
            .with_batch_size(size(1))
            .submit(&store, &records);

        assert_eq!(store.submission_calls(), 3);
        let first = records.first().cloned().expect("first record");
        let third = records.get(2).cloned().expect("third record");
        assert_eq!(store.submitted_records(), vec![first, third]);
        assert_eq!(report.failed_batches, vec![1]);
        assert_eq!(report.results.len(), 2);
    }

    #[rstest]
    fn update_toggles_tracking_around_batches(store: RecordingStore) {
        let records = numbered_records(4);
        EditSubmitter::new(Operation::Update)
            .with_batch_size(size(2))
            .with_tracking_target(&store)
            .submit(&store, &records);

        assert_eq!(store.tracking_calls(), vec![false, true]);
        assert_eq!(store.events_summary(), "T0 S S T1");
    }

    #[rstest]
    fn add_leaves_tracking_alone(store: RecordingStore) {
        EditSubmitter::new(Operation::Add)
            .with_tracking_target(&store)
            .submit(&store, &numbered_records(2));

        assert!(store.tracking_calls().is_empty());
    }

    #[rstest]
    fn tracking_restored_when_every_batch_fails(store: RecordingStore) {
        store.fail_all(StoreError::Service {
            code: 500,
            message: "boom".into(),
        });
        let report = EditSubmitter::new(Operation::Update)
            .with_tracking_target(&store)
            .submit(&store, &numbered_records(3));

        assert_eq!(report.failed_batches, vec![0]);
        assert_eq!(store.tracking_calls(), vec![false, true]);
    }

    #[rstest]
    fn tracking_restored_when_submission_panics(store: RecordingStore) {
        store.panic_on_call(0);
        let records = numbered_records(2);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            EditSubmitter::new(Operation::Update)
                .with_tracking_target(&store)
                .submit(&store, &records)
        }));

        assert!(outcome.is_err(), "expected the submission panic to propagate");
        assert_eq!(store.tracking_calls(), vec![false, true]);
    }

    #[rstest]
    fn tracking_failures_are_swallowed(store: RecordingStore) {
        store.fail_tracking(StoreError::Http {
            url: "http://portal.example/admin".into(),
            status: 403,
            message: "forbidden".into(),
        });
        let report = EditSubmitter::new(Operation::Update)
            .with_tracking_target(&store)
            .submit(&store, &numbered_records(2));

        assert_eq!(report.total_succeeded(), 2);
        assert_eq!(store.tracking_calls(), vec![false, true]);
    }

    #[rstest]
    fn partial_rejections_are_counted(store: RecordingStore) {
        store.reject_records(&[1]);
        let report = EditSubmitter::new(Operation::Add).submit(&store, &numbered_records(3));

        let result = report.results.first().copied().expect("one batch result");
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.reported, 3);
    }

    #[rstest]
    fn global_id_flag_reaches_the_store(store: RecordingStore) {
        EditSubmitter::new(Operation::Add)
            .with_global_ids(true)
            .submit(&store, &numbered_records(1));

        assert_eq!(store.global_id_flags(), vec![true]);
    }

    #[rstest]
    fn submit_with_runs_the_producer(store: RecordingStore) {
        let report = EditSubmitter::new(Operation::Add)
            .with_batch_size(size(2))
            .submit_with(&store, || numbered_records(5));

        assert_eq!(report.batches_attempted(), 3);
        assert_eq!(store.submitted_batch_sizes(), vec![2, 2, 1]);
    }
}
