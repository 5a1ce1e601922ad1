//! # Observability
//!
//! Optional tracing setup for applications embedding the toolkit. The library
//! only emits `tracing` events; nothing is printed unless the host installs a
//! subscriber, either its own or the one built by [`init`].

use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level captured for `a2ui_toolkit`.
    pub level: Level,
    /// The target for the logs.
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// The filter directive applied on top of `RUST_LOG`.
pub fn default_directive(level: Level) -> String {
    format!("a2ui_toolkit={}", level)
}

/// Initializes the global tracing subscriber.
///
/// Call once at startup. Fails if a global subscriber is already set or
/// the log file cannot be created.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directive: Directive = default_directive(config.level).parse()?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            subscriber.with(layer).try_init()?;
        }
    };

    Ok(())
}
