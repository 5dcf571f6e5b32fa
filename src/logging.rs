//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; applications decide where they
//! go. [`init`] installs a `fmt` subscriber filtered by `RUST_LOG` (default
//! `info`), printing JSON when `ROUTEWEAVE_LOG_FORMAT=json`.
//!
//! ```no_run
//! routeweave::logging::init();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// `ROUTEWEAVE_LOG_FORMAT`: `json` or anything else for pretty output.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("ROUTEWEAVE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber with the format from the environment.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init() -> bool {
    init_with(LogFormat::from_env(), "info")
}

/// Install the global subscriber. `default_filter` applies when `RUST_LOG`
/// is unset or invalid.
pub fn init_with(format: LogFormat, default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let _ = init_with(LogFormat::Pretty, "warn");
        assert!(!init_with(LogFormat::Json, "warn"));
    }
}
