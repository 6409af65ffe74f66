//! Logging for the hook. The runtime reads the hook's stderr as its error
//! message, so tracing output only goes to a log file and/or the systemd
//! journal, never to stderr.
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::prelude::*;

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";
enum LogFormat {
    Text,
    Json,
}

const DEFAULT_LOG_LEVEL: Level = Level::ERROR;

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

fn detect_log_level(input: Option<&str>, is_debug: bool) -> Result<Level> {
    // `log-level` takes precedence over `debug` when both are given.
    match input {
        Some(level) => Ok(Level::from_str(level)?),
        None if is_debug => Ok(Level::DEBUG),
        None => Ok(DEFAULT_LOG_LEVEL),
    }
}

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
    pub systemd_log: bool,
}

impl From<&crate::Opts> for ObservabilityConfig {
    fn from(opts: &crate::Opts) -> Self {
        Self {
            log_debug_flag: opts.global.debug,
            log_level: opts.global.log_level.to_owned(),
            log_file: opts.global.log.to_owned(),
            log_format: opts.global.log_format.to_owned(),
            systemd_log: opts.global.systemd_log,
        }
    }
}

/// Installs the global subscriber. Without a log file and without
/// `systemd_log` nothing is installed and events are dropped.
pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level.as_deref(), config.log_debug_flag)
        .with_context(|| "failed to parse log level")?;
    let log_format = detect_log_format(config.log_format.as_deref())
        .with_context(|| "failed to detect log format")?;

    let log_file = config
        .log_file
        .as_ref()
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path:?}"))
        })
        .transpose()?;

    if log_file.is_none() && !config.systemd_log {
        return Ok(());
    }

    let file_layer = log_file.map(|file| match log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .with_writer(file)
            .boxed(),
    });

    let (journald_layer, journald_err) = if config.systemd_log {
        match tracing_journald::layer() {
            Ok(layer) => (
                Some(layer.with_syslog_identifier("cpuset-hook".to_string())),
                None,
            ),
            Err(err) => (None, Some(err)),
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::from(level))
        .with(file_layer)
        .with(journald_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;

    // Hooks also run where journald is unreachable, e.g. inside nested
    // containers. The log file, if any, still gets the events.
    if let Some(err) = journald_err {
        tracing::warn!(?err, "failed to initialize journald logging");
    }

    Ok(())
}
