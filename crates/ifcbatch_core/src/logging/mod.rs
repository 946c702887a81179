//! Logging infrastructure.
//!
//! The core logs through the `tracing` macros everywhere; this module
//! owns subscriber setup. Output goes to stderr, optionally mirrored
//! into a rotating file next to the run artifacts via
//! `tracing-appender`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber for application-wide
/// logging.
///
/// - Respects the `RUST_LOG` environment variable, falling back to the
///   provided default directive.
/// - Writes to stderr with targets; when `log_dir` is given, a daily
///   rotating file in that directory receives the same events without
///   ANSI colors.
///
/// Returns the appender guard when file logging is enabled; the caller
/// must keep it alive for the duration of the process or buffered log
/// lines are lost on exit. Call once at startup.
pub fn init_tracing(default_directive: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ifcbatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}
