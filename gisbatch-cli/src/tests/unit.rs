//! Focused unit tests covering append configuration and task files.

use super::helpers::{LAYER_URL, Workspace, task_json, write_utf8};
use super::*;
use crate::append::{AppendConfig, config_from_layers_for_test};
use crate::tasks::load_task_file;
use camino::{Utf8Path, Utf8PathBuf};
use gisbatch_core::{DataType, Operation};
use rstest::rstest;
use serde_json::json;

#[rstest]
fn converting_without_tasks_errors() {
    let cli = Cli::try_parse_from(["gisbatch", "append"]).expect("flags are optional for clap");
    let Command::Append(args) = cli.command;
    let err = AppendConfig::try_from(args).expect_err("missing tasks should error");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_APPEND_TASKS);
            assert_eq!(env, ENV_APPEND_TASKS);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn append_config_defaults_log_dir_and_drops_blank_token() {
    let cli = Cli::try_parse_from([
        "gisbatch",
        "append",
        "--tasks",
        "config/tasks.json",
        "--token",
        "  ",
    ])
    .expect("arguments parse");
    let Command::Append(args) = cli.command;
    let config = AppendConfig::try_from(args).expect("config should build");
    assert_eq!(config.tasks, Utf8PathBuf::from("config/tasks.json"));
    assert_eq!(config.log_dir, Utf8PathBuf::from("logs"));
    assert_eq!(config.token, None);
    assert_eq!(config.last_run, None);
}

#[rstest]
fn append_config_debug_redacts_token() {
    let config = AppendConfig {
        token: Some("s3cret".to_owned()),
        ..Workspace::new().config()
    };
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("s3cret"));
    assert!(rendered.contains("<redacted>"));
}

#[rstest]
fn validate_sources_reports_missing_task_file() {
    let workspace = Workspace::new();
    let err = workspace
        .config()
        .validate_sources()
        .expect_err("missing task file");
    match err {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(field, ARG_APPEND_TASKS);
            assert_eq!(path, workspace.tasks_path());
        }
        other => panic!("expected MissingSourceFile, found {other:?}"),
    }
}

#[rstest]
fn validate_sources_rejects_directories() {
    let workspace = Workspace::new();
    std::fs::create_dir(workspace.tasks_path()).expect("task directory");
    let err = workspace
        .config()
        .validate_sources()
        .expect_err("directory should be rejected");
    match err {
        CliError::SourcePathNotFile { field, .. } => assert_eq!(field, ARG_APPEND_TASKS),
        other => panic!("expected SourcePathNotFile, found {other:?}"),
    }
}

#[rstest]
fn load_task_file_decodes_external_format() {
    let workspace = Workspace::new();
    workspace.write_tasks(&json!({
        "batchSize": 250,
        "tasks": [
            {
                "description": "Inspections",
                "skip": false,
                "dataType": "TABLES",
                "source": "inspections.json",
                "target": {
                    "url": LAYER_URL,
                    "truncateFirst": true,
                    "check4Existing": true,
                    "operation": "update",
                    "trackingService": "https://services.example.com/arcgis/rest/services/Trees/FeatureServer"
                }
            },
            {
                "description": "Trees",
                "skip": true,
                "dataType": "LAYERS",
                "source": "/data/trees.json",
                "target": {"url": LAYER_URL, "truncateFirst": false, "check4Existing": false}
            }
        ]
    }));

    let task_file = load_task_file(&workspace.tasks_path()).expect("task file parses");
    assert_eq!(task_file.batch_size.get(), 250);
    assert_eq!(task_file.tasks.len(), 2);

    let first = task_file.tasks.first().expect("first task");
    assert_eq!(first.data_type, DataType::Tables);
    assert_eq!(first.target.operation, Operation::Update);
    assert!(first.target.check_for_existing);
    assert!(first.target.truncate_first);
    assert!(first.target.tracking_service.is_some());

    let second = task_file.tasks.get(1).expect("second task");
    assert_eq!(second.target.operation, Operation::Add);
    assert!(second.target.tracking_service.is_none());

    let active: Vec<_> = task_file
        .active_tasks()
        .map(|task| task.description.as_str())
        .collect();
    assert_eq!(active, vec!["Inspections"]);
}

#[rstest]
fn load_task_file_defaults_batch_size() {
    let workspace = Workspace::new();
    workspace.write_tasks(&json!({"tasks": [task_json("Trees", "trees.json", LAYER_URL)]}));
    let task_file = load_task_file(&workspace.tasks_path()).expect("task file parses");
    assert_eq!(task_file.batch_size.get(), 1000);
}

#[rstest]
#[case::zero_batch(br#"{"batchSize": 0, "tasks": []}"#.as_slice())]
#[case::bad_data_type(br#"{"tasks": [{"source": "a.json", "dataType": "RASTERS", "target": {"url": "x"}}]}"#.as_slice())]
#[case::truncated(b"{\"tasks\": [".as_slice())]
fn load_task_file_rejects_malformed_files(#[case] contents: &[u8]) {
    let workspace = Workspace::new();
    write_utf8(&workspace.tasks_path(), contents);
    let err = load_task_file(&workspace.tasks_path()).expect_err("malformed task file");
    match err {
        CliError::ParseTaskFile { path, .. } => assert_eq!(path, workspace.tasks_path()),
        other => panic!("expected ParseTaskFile, found {other:?}"),
    }
}

#[rstest]
fn load_task_file_reports_open_errors() {
    let workspace = Workspace::new();
    let err = load_task_file(&workspace.tasks_path()).expect_err("missing task file");
    match err {
        CliError::OpenTaskFile { path, .. } => assert_eq!(path, workspace.tasks_path()),
        other => panic!("expected OpenTaskFile, found {other:?}"),
    }
}

#[rstest]
#[case("trees.json", "/srv/config/trees.json")]
#[case("/data/trees.json", "/data/trees.json")]
fn task_sources_resolve_against_task_file(#[case] source: &str, #[case] expected: &str) {
    let task: crate::tasks::Task =
        serde_json::from_value(task_json("Trees", source, LAYER_URL)).expect("task parses");
    assert_eq!(
        task.source_path(Utf8Path::new("/srv/config")),
        Utf8PathBuf::from(expected)
    );
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    use ortho_config::MergeComposer;

    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "tasks": 42 }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    use ortho_config::MergeComposer;

    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "tasks": "from-file/tasks.json",
            "log_dir": "from-file/logs",
            "token": "file-token",
        }),
        None,
    );
    composer.push_environment(json!({
        "tasks": "from-env/tasks.json",
        "token": "env-token",
    }));
    composer.push_cli(json!({
        "log_dir": "from-cli/logs",
    }));

    let config =
        config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.tasks, Utf8PathBuf::from("from-env/tasks.json"));
    assert_eq!(config.log_dir, Utf8PathBuf::from("from-cli/logs"));
    assert_eq!(config.token.as_deref(), Some("env-token"));
}
