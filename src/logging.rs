use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "sydney_events=info,tower_http=info";

/// Initializes logging to the console and to a daily-rolling JSON file in `log_dir`.
///
/// The returned guard flushes the file writer when dropped; hold it for the
/// life of the process. File output is skipped when `log_dir` cannot be created.
pub fn init_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let dir_error = fs::create_dir_all(log_dir).err();
    let (file_layer, guard) = if dir_error.is_none() {
        let file_appender = tracing_appender::rolling::daily(log_dir, "events.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        (
            Some(fmt::layer().json().with_writer(non_blocking_writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    if let Some(e) = dir_error {
        tracing::warn!("File logging disabled, cannot create {}: {}", log_dir.display(), e);
    }
    guard
}
