//! Logging setup. Trimmed from the teacher's OTEL-layered
//! `build_loglevel_filter_layer`/`init_otel_subscribers` pair down to a
//! plain `tracing-subscriber` registry: this server has no collector to
//! export spans to, so the OTEL layer and its `h2`/`hyper_util`/`tonic`
//! noise suppression have nothing to do here. The env-var-driven level
//! default and the "fall back to a given level, not a hardcoded one" shape
//! are kept.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `default_level` is used when
/// `RUST_LOG` isn't set; pass a stricter value than the config file's
/// default when running `configcheck`, so a one-off validation run
/// doesn't go quiet.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_falls_back_to_default_level_without_rust_log() {
        // SAFETY: test runs single-threaded; no other test reads RUST_LOG concurrently.
        unsafe {
            std::env::remove_var("RUST_LOG");
        }
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        assert_eq!(filter.to_string(), "warn");
    }
}
