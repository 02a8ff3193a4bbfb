//! `tracing` subscriber installation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

fn parse_name<T: Copy>(kind: &str, input: &str, table: &[(&str, T)]) -> TelemetryResult<T> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(input))
        .map(|(_, value)| *value)
        .ok_or_else(|| {
            let known: Vec<&str> = table.iter().map(|(name, _)| *name).collect();
            TelemetryError::InvalidSetting(format!(
                "{kind} '{input}' (known: {})",
                known.join(", ")
            ))
        })
}

/// How often rolling log files are cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// New file each day.
    #[default]
    Daily,
    /// New file each hour.
    Hourly,
    /// One file forever.
    Never,
}

impl FromStr for FileRotation {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_name(
            "rotation",
            s,
            &[("daily", Self::Daily), ("hourly", Self::Hourly), ("never", Self::Never)],
        )
    }
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One line per event.
    #[default]
    Compact,
    /// Multi-line, for a developer terminal.
    Pretty,
    /// One JSON object per line with fields flattened.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_name(
            "log format",
            s,
            &[("compact", Self::Compact), ("pretty", Self::Pretty), ("json", Self::Json)],
        )
    }
}

/// Where lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Rolling files under this directory.
    File(PathBuf),
}

/// Rolling file naming and retention for [`LogTarget::File`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// File name prefix; `custos` yields `custos.2026-10-18`.
    pub prefix: String,
    /// How often to cut a new file.
    pub rotation: FileRotation,
    /// Rotated files to keep. Zero keeps all of them.
    pub max_files: usize,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: "custos".to_owned(),
            rotation: FileRotation::Daily,
            max_files: 0,
        }
    }
}

/// Everything needed to install the process-wide subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter, e.g. `info`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub target: LogTarget,
    /// Used only with [`LogTarget::File`].
    pub file: FileLogConfig,
    /// Add source file and line to each event.
    pub file_info: bool,
    /// Emit an event when spans open and close.
    pub span_events: bool,
    /// Colour output. Never applied to files or JSON.
    pub ansi: bool,
    /// Extra per-target filters such as `custos_keys=debug`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
            file: FileLogConfig::default(),
            file_info: false,
            span_events: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Defaults at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Append one filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Write rolling files into `directory`. Turns colour off.
    #[must_use]
    pub fn with_file_output(mut self, directory: impl Into<PathBuf>, rotation: FileRotation) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file.rotation = rotation;
        self.ansi = false;
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let base = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::InvalidSetting(format!("level '{}': {e}", self.level)))?;
        self.directives.iter().try_fold(base, |filter, raw| {
            raw.parse::<Directive>()
                .map(|d| filter.add_directive(d))
                .map_err(|e| TelemetryError::InvalidSetting(format!("directive '{raw}': {e}")))
        })
    }

    fn writer(&self) -> TelemetryResult<(BoxMakeWriter, Option<WorkerGuard>)> {
        Ok(match &self.target {
            LogTarget::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
            LogTarget::Stderr => (BoxMakeWriter::new(std::io::stderr), None),
            LogTarget::File(dir) => {
                let (writer, guard) = tracing_appender::non_blocking(self.appender(dir)?);
                (BoxMakeWriter::new(writer), Some(guard))
            },
        })
    }

    fn appender(&self, dir: &Path) -> TelemetryResult<RollingFileAppender> {
        let dir_error = |source| TelemetryError::LogDirectory {
            path: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(dir_error)?;

        let mut builder = RollingFileAppender::builder()
            .rotation(self.file.rotation.into())
            .filename_prefix(&self.file.prefix);
        if self.file.max_files > 0 {
            builder = builder.max_log_files(self.file.max_files);
        }
        builder
            .build(dir)
            .map_err(|e| TelemetryError::Install(e.to_string()))
    }

    fn layer(&self, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
        let colour = self.ansi
            && self.format != LogFormat::Json
            && !matches!(self.target, LogTarget::File(_));
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(colour)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_span_events(spans);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
        }
    }
}

/// Holds the background writer for file output.
///
/// Buffered lines are flushed when this is dropped, so keep it alive until
/// the process exits.
#[must_use = "file logging stops when the guard is dropped"]
pub struct LoggingGuard {
    worker: Option<WorkerGuard>,
}

impl fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("background_writer", &self.worker.is_some())
            .finish()
    }
}

/// Install the global subscriber for `config`.
///
/// # Errors
///
/// Fails on a bad level or directive, an unusable log directory, or when a
/// subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LoggingGuard> {
    let filter = config.filter()?;
    let (writer, flush) = config.writer()?;

    tracing_subscriber::registry()
        .with(config.layer(writer))
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    Ok(LoggingGuard { worker: flush })
}

/// [`setup_logging`] with [`LogConfig::default`].
///
/// # Errors
///
/// Fails when a subscriber is already installed.
pub fn setup_default_logging() -> TelemetryResult<LoggingGuard> {
    setup_logging(&LogConfig::default())
}
