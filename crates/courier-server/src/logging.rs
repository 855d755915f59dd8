use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "courier=debug,courier_api=debug,courier_db=info,tower_http=debug";

/// Console logging filtered by `RUST_LOG`. With a request log directory,
/// `courier::requests` events are also appended to a daily `requests.log`.
/// Keep the returned guard alive for the life of the process.
pub fn init(request_log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console_layer = fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let (file_layer, guard) = match request_log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "requests.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .with_filter(Targets::new().with_target("courier::requests", Level::INFO));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
