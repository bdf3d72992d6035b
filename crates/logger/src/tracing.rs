use std::{env::var, path::Path};

use tracing::{level_filters::LevelFilter, warn};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize tracing, mirroring every event into `log_file` when one is given.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// must hold it for as long as events should reach the file.
pub fn init_with_file(log_file: Option<&Path>) -> Option<WorkerGuard> {
    initialize_tracing(LevelFilter::INFO, log_file)
}

fn initialize_tracing(level: LevelFilter, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = || EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT");
    let json = log_format.as_deref().is_ok_and(|format| format == "json");

    let console_layer = if json {
        tracing_subscriber::fmt::layer().json().with_filter(env_filter()).boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().with_filter(env_filter()).boxed()
    };

    let mut layers: Vec<BoxedLayer> = vec![console_layer];
    let mut file_error = None;
    let mut guard = None;

    if let Some(path) = log_file {
        match file_appender(path) {
            Ok(appender) => {
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter())
                    .boxed();
                layers.push(file_layer);
                guard = Some(worker_guard);
            }
            Err(error) => file_error = Some(error),
        }
    }

    if let Err(error) = tracing_subscriber::registry().with(layers).try_init() {
        warn!("Tracing subscriber already installed: {error}");
        return None;
    }

    if let Err(error) = log_format {
        tracing::debug!("RUST_LOG_FORMAT unavailable, using compact output: {error}");
    }
    if let Some(error) = file_error {
        warn!("Log file disabled: {error}");
    }

    guard
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{} has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|error| format!("{}: {error}", path.display()))
}
