//! Task file describing which datasets to append where.

use std::io::BufReader;
use std::num::NonZeroUsize;

use camino::{Utf8Path, Utf8PathBuf};
use gisbatch_core::{AppendOptions, DEFAULT_BATCH_SIZE, DataType, Operation};
use gisbatch_fs::open_utf8_file;
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Top-level task file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskFile {
    /// Records per chunk and per edit batch.
    #[serde(default = "default_batch_size")]
    pub(crate) batch_size: NonZeroUsize,
    /// Tasks in run order.
    #[serde(default)]
    pub(crate) tasks: Vec<Task>,
}

const fn default_batch_size() -> NonZeroUsize {
    DEFAULT_BATCH_SIZE
}

/// One source dataset appended to one target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Task {
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) skip: bool,
    #[serde(default)]
    pub(crate) data_type: DataType,
    /// Esri JSON feature set; relative paths resolve against the task file.
    pub(crate) source: Utf8PathBuf,
    pub(crate) target: TaskTarget,
}

/// Where and how a task writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskTarget {
    /// Layer or table REST URL.
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) truncate_first: bool,
    #[serde(default, rename = "check4Existing")]
    pub(crate) check_for_existing: bool,
    #[serde(default)]
    pub(crate) operation: Operation,
    /// Service whose editor tracking is suspended for updates. Derived from
    /// `url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) tracking_service: Option<String>,
}

impl Task {
    /// Source path, resolved against `base` when relative.
    pub(crate) fn source_path(&self, base: &Utf8Path) -> Utf8PathBuf {
        if self.source.is_absolute() {
            self.source.clone()
        } else {
            base.join(&self.source)
        }
    }

    pub(crate) const fn options(&self, batch_size: NonZeroUsize) -> AppendOptions {
        AppendOptions {
            data_type: self.data_type,
            operation: self.target.operation,
            batch_size,
            check_for_existing: self.target.check_for_existing,
            truncate_first: self.target.truncate_first,
        }
    }
}

impl TaskFile {
    /// Tasks not marked `skip`, in order.
    pub(crate) fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| !task.skip)
    }
}

/// Loads a JSON task file from disk.
pub(crate) fn load_task_file(path: &Utf8Path) -> Result<TaskFile, CliError> {
    let file = open_utf8_file(path).map_err(|source| CliError::OpenTaskFile {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| CliError::ParseTaskFile {
        path: path.to_path_buf(),
        source,
    })
}
