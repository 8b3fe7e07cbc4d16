use crate::config::project_dirs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Directory holding `deepchat.log`.
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_local_dir().join("logs"))
}

/// Sends `tracing` output to the log file. Stdout is left alone because the
/// bridge uses it as its transport.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let Some(dir) = log_dir() else {
        return Ok(());
    };

    std::fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("deepchat.log"))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false);

    Registry::default().with(filter).with(file_layer).try_init()?;

    Ok(())
}
