//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize logging for the executor
///
/// Logs go to stderr so the workflow engine captures them with the pod
/// output. `RUST_LOG` wins over the debug flag.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
