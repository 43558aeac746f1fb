//! Tracing setup.
//!
//! Sets a global subscriber once, filter taken from the `NUMASTORE_LOG`
//! environment variable when present, otherwise the config filter. Safe to
//! call more than once; later calls are no-ops.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::LoggingConfig;

const ENV_FILTER_VAR: &str = "NUMASTORE_LOG";

pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(ENV_FILTER_VAR)
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let logging = LoggingConfig::default();
        init(&logging);
        init(&logging);
    }
}
