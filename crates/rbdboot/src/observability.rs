//! Log setup for the `rbd` binary. Logs go to stderr, which is the console
//! during early boot, or to a file, and optionally to journald as well.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const SYSLOG_IDENTIFIER: &str = "rbd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            unknown => bail!("unknown log format: {unknown}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
    pub journald: bool,
}

/// Release builds only report errors on the boot console.
fn default_level() -> Level {
    if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::ERROR
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
            file: None,
            journald: false,
        }
    }
}

impl TryFrom<&crate::Opts> for LogConfig {
    type Error = anyhow::Error;

    fn try_from(opts: &crate::Opts) -> Result<Self> {
        // --log-level beats --debug and --verbose
        let level = match opts.rbd_extend.log_level.as_deref() {
            Some(level) => Level::from_str(level)
                .with_context(|| format!("invalid log level {level:?}"))?,
            None if opts.global.debug || opts.global.verbose => Level::DEBUG,
            None => default_level(),
        };
        let format = match opts.global.log_format.as_deref() {
            Some(format) => format.parse()?,
            None => LogFormat::Text,
        };

        Ok(Self {
            level,
            format,
            file: opts.global.log.clone(),
            journald: opts.rbd_extend.systemd_log,
        })
    }
}

fn make_writer(file: Option<&Path>) -> Result<BoxMakeWriter> {
    match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path:?}"))?;
            Ok(BoxMakeWriter::new(file))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

fn fmt_layer(config: &LogConfig) -> Result<BoxedLayer> {
    let filter = LevelFilter::from_level(config.level);
    let layer = tracing_subscriber::fmt::layer().with_writer(make_writer(config.file.as_deref())?);

    let layer = match (config.format, config.file.is_some()) {
        (LogFormat::Json, _) => layer
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, true) => layer.with_ansi(false).with_filter(filter).boxed(),
        // The console has no clock worth showing this early.
        (LogFormat::Text, false) => layer.without_time().with_filter(filter).boxed(),
    };
    Ok(layer)
}

pub fn init(config: &LogConfig) -> Result<()> {
    let mut layers = vec![fmt_layer(config)?];

    let mut journald_err = None;
    if config.journald {
        match tracing_journald::layer() {
            Ok(layer) => layers.push(
                layer
                    .with_syslog_identifier(SYSLOG_IDENTIFIER.to_string())
                    .with_filter(LevelFilter::from_level(config.level))
                    .boxed(),
            ),
            Err(err) => journald_err = Some(err),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("failed to init logger")?;

    if let Some(err) = journald_err {
        tracing::warn!(%err, "journald is not reachable, not logging to it");
    }
    Ok(())
}
