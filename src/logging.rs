//! Tracing subscriber setup: console output plus an optional daily log file

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log level when neither RUST_LOG nor the config sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `ctrip_spider=debug`
    pub level: String,
    /// Directory for rolling log files; console only when unset
    pub directory: Option<PathBuf>,
    pub file_name: String,
    /// Filter given on the command line; beats both RUST_LOG and `level`
    #[serde(skip)]
    pub level_override: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_name: "ctrip-spider.log".to_string(),
            level_override: None,
        }
    }
}

impl LogConfig {
    /// Set the configured level, used when RUST_LOG is unset
    pub fn with_level(mut self, level: String) -> Self {
        self.level = level;
        self
    }

    /// Force a filter regardless of RUST_LOG
    pub fn with_level_override(mut self, level: String) -> Self {
        self.level_override = Some(level);
        self
    }

    /// Write rolling log files into `directory`
    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = Some(directory);
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        self.filter_with_env(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
    }

    /// Precedence: `level_override`, then a valid RUST_LOG, then `level`
    fn filter_with_env(&self, env: Option<&str>) -> Result<EnvFilter> {
        if let Some(level) = &self.level_override {
            return Ok(EnvFilter::try_new(level)?);
        }
        match env.map(EnvFilter::try_new) {
            Some(Ok(filter)) => Ok(filter),
            _ => Ok(EnvFilter::try_new(&self.level)?),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the program.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.filter()?;
    let console = fmt::layer().with_target(true);

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()?;
            Ok(None)
        }
    }
}
