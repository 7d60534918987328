//! Logging setup for native hosts.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable read for log directives.
pub const LOG_ENV: &str = "RUST_LOG";

/// Default directives: `info`, or `debug` when `verbose`.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "plausible_tracker=debug,info"
    } else {
        "info"
    }
}

/// Install the global fmt subscriber.
///
/// [`LOG_ENV`] overrides the defaults when set and valid. Calling this more
/// than once is a no-op.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_enables_debug() {
        assert!(default_directives(true).contains("debug"));
        assert!(!default_directives(false).contains("debug"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(false);
        init_logging(true);
        tracing::info!("still logging");
    }
}
