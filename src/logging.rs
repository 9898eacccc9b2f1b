//! Tracing subscriber bootstrap.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "soul_chat=info,soul_transport_ws=info";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: Option<String>,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(self.default_filter.as_deref().unwrap_or(DEFAULT_FILTER))
        })
    }
}

/// Installs the global fmt subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed. Opening the log file is the
/// only failure.
pub fn init(config: &LogConfig) -> io::Result<bool> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(true);

    let installed = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => builder.with_writer(io::stderr).try_init().is_ok(),
    };

    Ok(installed)
}
