// Logging module - Logging infrastructure
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// Status lines and the relay own stdout; log records stay on stderr so
/// diagnostics never interleave with raw-mode output.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "replug=debug" } else { "replug=warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init_is_idempotent() {
        init_logging(false);
        init_logging(true);
    }
}
