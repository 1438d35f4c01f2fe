//! Logging setup with `tracing-subscriber`.
//!
//! Every handler task runs inside an `update` span carrying `update_id` and
//! `kind`. Turning on `close` span events logs one line per handler run with
//! its busy and idle time.
//!
//! ```rust,ignore
//! use ferrogram_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::new()
//!     .directive("ferrogram_transport=debug")
//!     .file_path("logs/bot.log")
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a subscriber is already installed, so tests and embedding
/// applications keep their own.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

fn fmt_span(events: &SpanEventConfig) -> FmtSpan {
    [
        (events.new, FmtSpan::NEW),
        (events.enter, FmtSpan::ENTER),
        (events.exit, FmtSpan::EXIT),
        (events.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
}

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    level: LogLevel,
    directives: Vec<String>,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    thread_ids: bool,
    file_location: bool,
    span_events: SpanEventConfig,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level,
            directives: config
                .filters
                .iter()
                .map(|(module, level)| format!("{module}={level}"))
                .collect(),
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            rotation: config.rotation,
            thread_ids: config.thread_ids,
            file_location: config.file_location,
            span_events: config.span_events,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `"ferrogram_framework=trace"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Sets the log file and switches output to it.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self.output = LogOutput::File;
        self
    }

    pub fn span_events(mut self, events: SpanEventConfig) -> Self {
        self.span_events = events;
        self
    }

    /// `RUST_LOG` replaces the configured level; directives apply on top.
    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));
        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring invalid log directive {directive:?}: {e}"),
            }
        }
        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => BoxMakeWriter::new(appender(path, self.rotation)),
            (LogOutput::File, None) => {
                eprintln!("File output requested but no file path configured, using stdout");
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(self.writer())
            .with_span_events(fmt_span(&self.span_events))
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_location)
            .with_line_number(self.file_location);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("JSON logging needs the `json-log` feature, using compact format");
                layer.compact().boxed()
            }
        }
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber, failing if one is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init()
    }
}

fn appender(path: &Path, rotation: LogRotation) -> RollingFileAppender {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path.file_name().unwrap_or_else(|| OsStr::new("ferrogram.log"));
    match rotation {
        LogRotation::Never => rolling::never(dir, name),
        LogRotation::Hourly => rolling::hourly(dir, name),
        LogRotation::Daily => rolling::daily(dir, name),
    }
}
