//! Logging initialization.
//!
//! Library code only emits `tracing` events; binaries and test harnesses
//! decide where they go by calling [`init_telemetry`] once.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber with the given filter directive.
pub fn init_telemetry(log_level: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(init_telemetry("wasmhost=loud", false).is_err());
    }

    #[test]
    fn test_init_telemetry() {
        // A second global subscriber is refused, so only the call matters
        let _ = init_telemetry("info", false);
    }
}
