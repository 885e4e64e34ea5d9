//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::error::{ClientError, ClientResult};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info,imutis=debug,sqlx=warn";

/// Installs the global fmt subscriber.
///
/// Honors `RUST_LOG`. Fails if a global subscriber is already set, so hosts
/// that install their own can ignore the error.
pub fn init_tracing() -> ClientResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ClientError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_reports_error() {
        // Whichever call loses the race to install reports Telemetry
        let first = init_tracing();
        let second = init_tracing();
        assert!(first.is_ok() || matches!(first, Err(ClientError::Telemetry(_))));
        assert!(matches!(second, Err(ClientError::Telemetry(_))));
    }
}
