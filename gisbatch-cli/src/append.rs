//! Append command implementation for the gisbatch CLI.

use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use gisbatch_core::{
    AppendSummary, EditSink, Operation, TargetLayer, TrackingControl, append_rows,
};
use gisbatch_data::{PortalClient, PortalClientConfig, load_feature_set};
use log::{error, info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::tasks::{Task, TaskFile, TaskTarget, load_task_file};
use crate::{
    ARG_APPEND_LAST_RUN, ARG_APPEND_LOG_DIR, ARG_APPEND_TASKS, ARG_APPEND_TOKEN, CliError,
    ENV_APPEND_TASKS, describe_chain, logging,
};

/// Script name stamped into log file names.
pub(crate) const SCRIPT_NAME: &str = "append";
const DEFAULT_LOG_DIR: &str = "logs";
const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CLI arguments for the `append` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Append source datasets to hosted layers and tables as \
                 described by a JSON task file. Each task reads an Esri JSON \
                 feature set, optionally truncates the target or skips rows \
                 already present, and submits the records in batches.",
    about = "Append datasets to hosted layers in batches"
)]
#[ortho_config(prefix = "GISBATCH")]
pub(crate) struct AppendArgs {
    /// Path to the JSON task file.
    #[arg(long = ARG_APPEND_TASKS, value_name = "path")]
    #[serde(default)]
    pub(crate) tasks: Option<Utf8PathBuf>,
    /// Directory receiving dated run logs.
    #[arg(long = ARG_APPEND_LOG_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) log_dir: Option<Utf8PathBuf>,
    /// Pre-issued portal token.
    #[arg(long = ARG_APPEND_TOKEN, value_name = "token")]
    #[serde(default)]
    pub(crate) token: Option<String>,
    /// File recording the start and end of the last successful run.
    #[arg(long = ARG_APPEND_LAST_RUN, value_name = "path")]
    #[serde(default)]
    pub(crate) last_run: Option<Utf8PathBuf>,
}

impl AppendArgs {
    pub(crate) fn into_config(self) -> Result<AppendConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AppendConfig::try_from(merged)
    }
}

/// Resolved `append` command configuration.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct AppendConfig {
    pub(crate) tasks: Utf8PathBuf,
    pub(crate) log_dir: Utf8PathBuf,
    pub(crate) token: Option<String>,
    pub(crate) last_run: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for AppendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendConfig")
            .field("tasks", &self.tasks)
            .field("log_dir", &self.log_dir)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("last_run", &self.last_run)
            .finish()
    }
}

impl AppendConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        match gisbatch_fs::file_is_file(&self.tasks) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field: ARG_APPEND_TASKS,
                path: self.tasks.clone(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field: ARG_APPEND_TASKS,
                    path: self.tasks.clone(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field: ARG_APPEND_TASKS,
                path: self.tasks.clone(),
                source,
            }),
        }
    }

    /// Directory relative task sources resolve against.
    fn task_base_dir(&self) -> &Utf8Path {
        match self.tasks.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        }
    }
}

impl TryFrom<AppendArgs> for AppendConfig {
    type Error = CliError;

    fn try_from(args: AppendArgs) -> Result<Self, Self::Error> {
        let tasks = args.tasks.ok_or(CliError::MissingArgument {
            field: ARG_APPEND_TASKS,
            env: ENV_APPEND_TASKS,
        })?;
        Ok(Self {
            tasks,
            log_dir: args
                .log_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_LOG_DIR)),
            token: args.token.filter(|token| !token.trim().is_empty()),
            last_run: args.last_run,
        })
    }
}

/// Store a task appends to.
pub(crate) trait AppendTarget: EditSink + TargetLayer {}

impl<T: EditSink + TargetLayer + ?Sized> AppendTarget for T {}

/// Connects tasks to their remote layers and tracking services.
pub(crate) trait TargetBuilder {
    fn layer<'a>(&'a self, task: &Task) -> Result<Box<dyn AppendTarget + 'a>, CliError>;

    /// Tracking switch for `task`, or `None` when it cannot be resolved.
    fn tracking<'a>(
        &'a self,
        task: &Task,
    ) -> Result<Option<Box<dyn TrackingControl + 'a>>, CliError>;
}

/// Builds feature service handles over a shared [`PortalClient`].
pub(crate) struct PortalTargetBuilder {
    client: PortalClient,
}

impl PortalTargetBuilder {
    pub(crate) fn new(config: &AppendConfig) -> Result<Self, CliError> {
        let mut client_config = PortalClientConfig::default();
        if let Some(token) = &config.token {
            client_config = client_config.with_token(token.clone());
        }
        Ok(Self {
            client: PortalClient::new(client_config)?,
        })
    }
}

fn invalid_target(task: &Task) -> impl FnOnce(gisbatch_data::ServiceUrlError) -> CliError + '_ {
    move |source| CliError::InvalidTarget {
        task: task.description.clone(),
        source,
    }
}

impl TargetBuilder for PortalTargetBuilder {
    fn layer<'a>(&'a self, task: &Task) -> Result<Box<dyn AppendTarget + 'a>, CliError> {
        let layer = self
            .client
            .layer(&task.target.url)
            .map_err(invalid_target(task))?;
        Ok(Box::new(layer))
    }

    fn tracking<'a>(
        &'a self,
        task: &Task,
    ) -> Result<Option<Box<dyn TrackingControl + 'a>>, CliError> {
        let TaskTarget {
            url,
            tracking_service,
            ..
        } = &task.target;
        if let Some(service_url) = tracking_service {
            let service = self
                .client
                .service(service_url)
                .map_err(invalid_target(task))?;
            return Ok(Some(Box::new(service)));
        }
        let layer = self.client.layer(url).map_err(invalid_target(task))?;
        Ok(layer
            .owning_service()
            .map(|service| Box::new(service) as Box<dyn TrackingControl + 'a>))
    }
}

pub(super) fn run_append(args: AppendArgs) -> Result<(), CliError> {
    let config = resolve_append_config(args)?;
    logging::init(&config.log_dir, SCRIPT_NAME, Local::now().naive_local())?;
    run_configured(&config, PortalTargetBuilder::new)?;
    Ok(())
}

fn resolve_append_config(args: AppendArgs) -> Result<AppendConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Load the task file, connect to the portal and run every task.
///
/// Runs inside the logged and timed scope, so a task file or client that
/// cannot be set up is logged with its causes before being returned.
pub(super) fn run_configured<B, F>(
    config: &AppendConfig,
    connect: F,
) -> Result<Option<Vec<AppendSummary>>, CliError>
where
    B: TargetBuilder,
    F: FnOnce(&AppendConfig) -> Result<B, CliError>,
{
    let _run_timer = RunTimer::start();
    let prepared = load_task_file(&config.tasks)
        .and_then(|task_file| connect(config).map(|builder| (task_file, builder)));
    match prepared {
        Ok((task_file, builder)) => Ok(run_loaded(config, &task_file, &builder)),
        Err(err) => {
            error!("{}", describe_chain(&err));
            Err(err)
        }
    }
}

/// Run every active task, logging failures instead of returning them.
///
/// The first failing task stops the run. The total run time is logged
/// whatever happens, and the last-run record is only written when every
/// task completed.
pub(super) fn run_append_with(
    config: &AppendConfig,
    task_file: &TaskFile,
    builder: &dyn TargetBuilder,
) -> Option<Vec<AppendSummary>> {
    let _run_timer = RunTimer::start();
    run_loaded(config, task_file, builder)
}

fn run_loaded(
    config: &AppendConfig,
    task_file: &TaskFile,
    builder: &dyn TargetBuilder,
) -> Option<Vec<AppendSummary>> {
    let started_utc = Utc::now();
    let outcome = run_tasks(config, task_file, builder).and_then(|summaries| {
        if let Some(path) = &config.last_run {
            write_last_run(path, started_utc, Utc::now())?;
        }
        Ok(summaries)
    });
    match outcome {
        Ok(summaries) => Some(summaries),
        Err(err) => {
            error!("{}", describe_chain(&err));
            None
        }
    }
}

fn run_tasks(
    config: &AppendConfig,
    task_file: &TaskFile,
    builder: &dyn TargetBuilder,
) -> Result<Vec<AppendSummary>, CliError> {
    let base = config.task_base_dir();
    let mut summaries = Vec::new();
    for task in task_file.active_tasks() {
        info!("*********** {} ***********", task.description);
        let timer = TaskTimer::start();
        summaries.push(run_task(task, task_file, base, builder)?);
        info!("... task run time: {} Minutes", timer.elapsed_minutes());
    }
    Ok(summaries)
}

fn run_task(
    task: &Task,
    task_file: &TaskFile,
    base: &Utf8Path,
    builder: &dyn TargetBuilder,
) -> Result<AppendSummary, CliError> {
    let rows = load_feature_set(&task.source_path(base)).map_err(|source| {
        CliError::LoadSource {
            task: task.description.clone(),
            source,
        }
    })?;
    let layer = builder.layer(task)?;
    let tracking = match task.target.operation {
        Operation::Update => {
            let tracking = builder.tracking(task)?;
            if tracking.is_none() {
                warn!(
                    "no tracking service for {}; editor tracking left unchanged",
                    task.target.url
                );
            }
            tracking
        }
        Operation::Add => None,
    };
    let summary = append_rows(
        layer.as_ref(),
        &rows,
        &task.options(task_file.batch_size),
        tracking.as_deref(),
    )
    .map_err(|source| CliError::Append {
        task: task.description.clone(),
        source,
    })?;
    info!(
        "{}: {} rows read, {} skipped as existing, {} of {} records applied",
        task.description,
        summary.rows_read,
        summary.skipped_existing,
        summary.report.total_succeeded(),
        summary.report.total_attempted()
    );
    Ok(summary)
}

fn write_last_run(
    path: &Utf8Path,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> Result<(), CliError> {
    let record = serde_json::json!({
        "note": "The time is in UTC",
        "lastTimeStart": started.format(LAST_RUN_FORMAT).to_string(),
        "lastTimeEnd": finished.format(LAST_RUN_FORMAT).to_string(),
    });
    let payload = serde_json::to_vec_pretty(&record).map_err(CliError::SerialiseLastRun)?;
    gisbatch_fs::write_file(path, &payload).map_err(|source| CliError::WriteLastRun {
        path: path.to_path_buf(),
        source,
    })
}

struct TaskTimer(Instant);

impl TaskTimer {
    fn start() -> Self {
        Self(Instant::now())
    }

    fn elapsed_minutes(&self) -> String {
        format_minutes(self.0.elapsed())
    }
}

/// Minutes with two decimals, truncated.
pub(crate) fn format_minutes(elapsed: Duration) -> String {
    // One hundredth of a minute is 600 ms.
    let hundredths = elapsed.as_millis().div_euclid(600);
    format!(
        "{}.{:02}",
        hundredths.div_euclid(100),
        hundredths.rem_euclid(100)
    )
}

/// Logs the total run time when dropped.
struct RunTimer(TaskTimer);

impl RunTimer {
    fn start() -> Self {
        Self(TaskTimer::start())
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        info!("Program run time: {} Minutes", self.0.elapsed_minutes());
    }
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<AppendConfig, CliError> {
    let merged = AppendArgs::merge_from_layers(layers).map_err(CliError::from)?;
    AppendConfig::try_from(merged)
}
