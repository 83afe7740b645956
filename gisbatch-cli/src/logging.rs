//! Run logging: console plus a dated log file per invocation.
//!
//! Files land in `<log-dir>/<YYYY_MM_DD>/Log_<script>_<YYYY_MM_DD>_<HH_MM_SS>.txt`.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use env_logger::{Builder, Env, Target};
use log::info;

use crate::CliError;

const DATE_FORMAT: &str = "%Y_%m_%d";
const TIME_FORMAT: &str = "%H_%M_%S";

/// Log file for a run of `script` started at `started`.
pub(crate) fn log_file_path(log_dir: &Utf8Path, script: &str, started: NaiveDateTime) -> Utf8PathBuf {
    let date = started.format(DATE_FORMAT).to_string();
    let time = started.format(TIME_FORMAT).to_string();
    log_dir
        .join(&date)
        .join(format!("Log_{script}_{date}_{time}.txt"))
}

/// Duplicates log output to the console and the run's log file.
struct Tee<F> {
    file: F,
    console: io::Stderr,
}

impl<F: Write> Write for Tee<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

/// Install the global logger and record the start of the run.
///
/// The level defaults to `info`; `RUST_LOG` overrides it.
pub(crate) fn init(
    log_dir: &Utf8Path,
    script: &str,
    started: NaiveDateTime,
) -> Result<Utf8PathBuf, CliError> {
    let path = log_file_path(log_dir, script, started);
    let file = gisbatch_fs::create_file(&path).map_err(|source| CliError::CreateLogFile {
        path: path.clone(),
        source,
    })?;
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(Tee {
            file,
            console: io::stderr(),
        })))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .try_init()
        .map_err(CliError::InstallLogger)?;
    info!(
        "Script started: {} - {}",
        started.format(DATE_FORMAT),
        started.format(TIME_FORMAT)
    );
    Ok(path)
}
