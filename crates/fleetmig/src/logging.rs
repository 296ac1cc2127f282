//! Subscriber setup for the binary

use fleetmig_context::Verbosity;
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Filter from `RUST_LOG`, falling back to the verbosity's default directive
#[must_use]
pub fn filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()))
}

/// Install the global subscriber, writing to stderr
///
/// # Errors
/// Fails if a global subscriber was already set.
pub fn init(verbosity: Verbosity, json: bool) -> Result<(), InitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_debug());
    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_grow_with_verbosity() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(filter(Verbosity::Normal).to_string(), "info");
        assert!(filter(Verbosity::Debug).to_string().contains("fleetmig=debug"));
    }
}
