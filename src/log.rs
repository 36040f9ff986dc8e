//! Sets up the program logger.
//!
//! Messages go to the terminal, split between stdout (below warning) and stderr (warnings and
//! errors). When a run has an output folder, the same messages are also written to two log files
//! there, without colours and with full dates.
use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Metadata, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// A flag indicating whether the logger has been initialised
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The default log level for the program.
///
/// Used as a fallback if the user hasn't specified something else with the `MICROGRID_LOG_LEVEL`
/// environment variable or the settings.toml file.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable used to override the log level
const LOG_LEVEL_ENV_VAR: &str = "MICROGRID_LOG_LEVEL";

/// Log file for messages below warning level
const LOG_INFO_FILE_NAME: &str = "microgrid_info.log";

/// Log file for warnings and errors
const LOG_ERROR_FILE_NAME: &str = "microgrid_error.log";

/// Prefix removed from log targets to keep lines short
const TARGET_PREFIX: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Convert a log level string (`off`, `error`, `warn`, `info`, `debug` or `trace`, in any case)
/// to a [`LevelFilter`]
fn parse_log_level(log_level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(log_level.trim())
        .with_context(|| format!("Unknown log level: {log_level}"))
}

/// Whether a message should go to the error stream rather than the ordinary one
fn is_warning_or_error(metadata: &Metadata) -> bool {
    metadata.level() <= LevelFilter::Warn
}

/// Messages to the terminal, coloured when the stream is a terminal
fn console_dispatch(log_level: LevelFilter) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let colour_stdout = std::io::stdout().is_terminal();
    let colour_stderr = std::io::stderr().is_terminal();

    let stdout = Dispatch::new()
        .filter(|metadata| !is_warning_or_error(metadata))
        .format(move |out, message, record| {
            if colour_stdout {
                write_console(out, colours.color(record.level()), record, message);
            } else {
                write_console(out, record.level(), record, message);
            }
        })
        .level(log_level)
        .chain(std::io::stdout());
    let stderr = Dispatch::new()
        .filter(is_warning_or_error)
        .format(move |out, message, record| {
            if colour_stderr {
                write_console(out, colours.color(record.level()), record, message);
            } else {
                write_console(out, record.level(), record, message);
            }
        })
        .level(log_level)
        .chain(std::io::stderr());

    Dispatch::new().chain(stdout).chain(stderr)
}

/// Messages to the log files in `dir`.
///
/// The info log always records at least `info` level messages, so that a run can be inspected
/// afterwards even if the terminal was kept quiet.
fn file_dispatch(dir: &Path, log_level: LevelFilter) -> Result<Dispatch> {
    let create = |file_name: &str| {
        let path = dir.join(file_name);
        File::create(&path).with_context(|| format!("Could not create {}", path.display()))
    };

    let info = Dispatch::new()
        .filter(|metadata| !is_warning_or_error(metadata))
        .format(write_file)
        .level(log_level.max(LevelFilter::Info))
        .chain(create(LOG_INFO_FILE_NAME)?);
    let error = Dispatch::new()
        .filter(is_warning_or_error)
        .format(write_file)
        .level(LevelFilter::Warn)
        .chain(create(LOG_ERROR_FILE_NAME)?);

    Ok(Dispatch::new().chain(info).chain(error))
}

/// Initialise the program logger.
///
/// The level is taken from the `MICROGRID_LOG_LEVEL` environment variable if set, otherwise from
/// `settings.toml` (which defaults to `info`).
///
/// # Arguments
///
/// * `log_level_from_settings`: The log level specified in `settings.toml`
/// * `log_file_path`: Folder in which to save log files, if any
pub fn init(log_level_from_settings: &str, log_file_path: Option<&Path>) -> Result<()> {
    let log_level =
        env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| log_level_from_settings.to_string());
    let log_level = parse_log_level(&log_level)?;

    let mut dispatch = Dispatch::new().chain(console_dispatch(log_level));
    if let Some(dir) = log_file_path {
        dispatch = dispatch.chain(file_dispatch(dir, log_level)?);
    }
    dispatch.apply().context("Logger already initialised")?;

    let _ = LOGGER_INIT.set(());

    Ok(())
}

/// The module a message came from, relative to this crate
fn short_target<'a>(record: &'a Record) -> &'a str {
    record
        .target()
        .strip_prefix(TARGET_PREFIX)
        .unwrap_or(record.target())
}

fn write_console<T: Display>(out: FormatCallback, level: T, record: &Record, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");
    let target = short_target(record);
    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}

fn write_file(out: FormatCallback, message: &Arguments, record: &Record) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let level = record.level();
    let target = short_target(record);
    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}
