//! Test helpers: temporary workspaces, task files and a stub target builder.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use gisbatch_core::TrackingControl;
use gisbatch_core::test_support::{RecordingStore, named_schema};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::CliError;
use crate::append::{AppendConfig, AppendTarget, TargetBuilder};
use crate::tasks::Task;

pub(super) const LAYER_URL: &str =
    "https://services.example.com/arcgis/rest/services/Trees/FeatureServer/0";
pub(super) const OTHER_LAYER_URL: &str =
    "https://services.example.com/arcgis/rest/services/Trees/FeatureServer/1";

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write file");
}

/// Temporary directory holding a task file, its sources and run outputs.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn tasks_path(&self) -> Utf8PathBuf {
        self.root.join("tasks.json")
    }

    pub(super) fn last_run_path(&self) -> Utf8PathBuf {
        self.root.join("last_run.json")
    }

    /// Write a feature set named `name` whose rows carry `global_ids`.
    pub(super) fn write_source(&self, name: &str, global_ids: &[&str]) {
        let features: Vec<Value> = global_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                json!({
                    "attributes": {"globalid": id, "name": format!("tree {i}")},
                    "geometry": {"x": i, "y": i}
                })
            })
            .collect();
        let payload = json!({"geometryType": "esriGeometryPoint", "features": features});
        write_utf8(&self.root.join(name), payload.to_string().as_bytes());
    }

    pub(super) fn write_tasks(&self, task_file: &Value) {
        write_utf8(&self.tasks_path(), task_file.to_string().as_bytes());
    }

    pub(super) fn config(&self) -> AppendConfig {
        AppendConfig {
            tasks: self.tasks_path(),
            log_dir: self.root.join("logs"),
            token: None,
            last_run: Some(self.last_run_path()),
        }
    }
}

/// Task JSON appending `source` to `url`.
pub(super) fn task_json(description: &str, source: &str, url: &str) -> Value {
    json!({
        "description": description,
        "skip": false,
        "dataType": "LAYERS",
        "source": source,
        "target": {
            "url": url,
            "truncateFirst": false,
            "check4Existing": false
        }
    })
}

/// Target builder handing out [`RecordingStore`]s keyed by layer URL.
#[derive(Debug, Default)]
pub(super) struct StubTargetBuilder {
    stores: HashMap<String, RecordingStore>,
    without_tracking: bool,
}

impl StubTargetBuilder {
    /// Builder with an empty store behind [`LAYER_URL`] and [`OTHER_LAYER_URL`].
    pub(super) fn new() -> Self {
        let mut builder = Self::default();
        for url in [LAYER_URL, OTHER_LAYER_URL] {
            builder
                .stores
                .insert(url.to_owned(), RecordingStore::with_fields(named_schema()));
        }
        builder
    }

    /// Resolve no tracking service for any task.
    pub(super) fn without_tracking(mut self) -> Self {
        self.without_tracking = true;
        self
    }

    pub(super) fn store(&self, url: &str) -> &RecordingStore {
        self.stores
            .get(url)
            .unwrap_or_else(|| panic!("no stub store for {url}"))
    }
}

impl TargetBuilder for StubTargetBuilder {
    fn layer<'a>(&'a self, task: &Task) -> Result<Box<dyn AppendTarget + 'a>, CliError> {
        Ok(Box::new(self.store(&task.target.url)))
    }

    fn tracking<'a>(
        &'a self,
        task: &Task,
    ) -> Result<Option<Box<dyn TrackingControl + 'a>>, CliError> {
        if self.without_tracking {
            return Ok(None);
        }
        Ok(Some(Box::new(self.store(&task.target.url))))
    }
}
