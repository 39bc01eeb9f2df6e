use std::{fs, path::Path};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::error::IocError;

const ROTATE_BYTES: u64 = 1_000_000;

/// Installs a file + stdout subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: u8, log_file: &Path) -> Result<(), IocError> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| IocError::Config(e.to_string()))?;
        }
    }
    rotate_if_large(log_file);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| IocError::Config(e.to_string()))?;

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(false);

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| IocError::Config(e.to_string()))
}

fn rotate_if_large(log_file: &Path) {
    if let Ok(meta) = fs::metadata(log_file) {
        if meta.len() > ROTATE_BYTES {
            let rotated = log_file.with_extension("log.1");
            let _ = fs::rename(log_file, rotated);
        }
    }
}
