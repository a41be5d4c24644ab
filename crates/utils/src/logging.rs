//! provides logging helpers

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Environment variable naming a log file that mirrors stderr output.
pub const LOG_PATH_ENV_VAR: &str = "PODSET_LOG_PATH";

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Stderr formatting layer filtered by `RUST_LOG` (INFO by default).
pub fn get_fmt_layer<S>() -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter())
}

/// File layer writing to a daily-rotated, non-blocking appender.
///
/// Returns `None` when the path has no file name or the directory can't be used;
/// the caller keeps logging to stderr only.
pub fn get_file_layer<S>(path: &Path) -> Option<(impl Layer<S> + Send + Sync, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file_name = path.file_name()?.to_str()?;
    let directory = path.parent().unwrap_or(Path::new("."));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(3)
        .build(directory)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());
    Some((file_layer, guard))
}

/// initiate the global tracing subscriber
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init<P: AsRef<Path>>(log_file: Option<P>) -> Option<WorkerGuard> {
    let log_file = log_file
        .map(|p| p.as_ref().to_path_buf())
        .or_else(|| std::env::var_os(LOG_PATH_ENV_VAR).map(Into::into));

    let (file_layer, guard) = match log_file.as_deref().and_then(get_file_layer) {
        Some((file_layer, guard)) => (Some(file_layer), Some(guard)),
        None => (None, None),
    };

    registry().with(get_fmt_layer()).with(file_layer).init();
    guard
}
