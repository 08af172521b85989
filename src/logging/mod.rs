//! Logging System for ImageVault
//!
//! Installs a global `tracing` subscriber: an `EnvFilter` built from the
//! configured levels, a console layer and an optional rolling file layer.
//! The file writer is non-blocking; keep the returned `LoggingSystem` alive
//! for as long as log lines should reach the file.

mod config;


pub use config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig};

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File name prefix of rolled log files
pub const LOG_FILE_NAME: &str = "imagevault.log";

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Installed logging state
pub struct LoggingSystem {
    config: LoggingConfig,
    _guards: Vec<WorkerGuard>,
}

impl LoggingSystem {
    /// Install the global subscriber described by `config`
    ///
    /// Fails if a global subscriber is already set.
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        if config.output.writes_file() {
            let log_dir = Self::file_directory(&config);
            std::fs::create_dir_all(&log_dir).map_err(|e| {
                LoggingError::DirectoryCreationError(format!(
                    "Failed to create log directory {:?}: {}",
                    log_dir, e
                ))
            })?;
        }

        let mut guards = Vec::new();
        let env_filter = Self::build_env_filter(&config);
        let registry = tracing_subscriber::registry();

        match config.output {
            LogOutput::Console => {
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::File => {
                let (file_layer, guard) = Self::create_file_layer(&config);
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::Both => {
                let (file_layer, guard) = Self::create_file_layer(&config);
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
        }

        tracing::debug!(level = %config.level, output = ?config.output, "Logging initialized");

        Ok(Self {
            config,
            _guards: guards,
        })
    }

    /// Build environment filter from configuration
    ///
    /// `RUST_LOG` directives, when set, are applied on top.
    fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
        let mut filter = EnvFilter::new(config.level.to_string());

        for (module, level) in &config.module_levels {
            filter = filter.add_directive(
                format!("{}={}", module, level)
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            );
        }

        if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
            for directive in env.split(',').filter_map(|d| d.parse().ok()) {
                filter = filter.add_directive(directive);
            }
        }

        filter
    }

    fn create_console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info);

        if config.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    fn create_file_layer<S>(config: &LoggingConfig) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let rotation = match config.rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        };

        let file_appender =
            RollingFileAppender::new(rotation, Self::file_directory(config), LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(false);

        if config.format == LogFormat::Json {
            (layer.json().boxed(), guard)
        } else {
            (layer.boxed(), guard)
        }
    }

    fn file_directory(config: &LoggingConfig) -> PathBuf {
        config
            .log_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Get current log directory
    pub fn log_directory(&self) -> Option<&PathBuf> {
        self.config.log_directory.as_ref()
    }

    /// Get current log level
    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }
}

/// Initialize logging with default configuration
pub fn init_default_logging() -> LoggingResult<LoggingSystem> {
    LoggingSystem::init(LoggingConfig::default())
}
