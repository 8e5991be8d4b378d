use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,fuelcell_monitor=debug,fuelcell_core=debug,fuelcell_io=debug";

/// Initialize the tracing subscriber with optional JSON output.
///
/// `fuelcell-core` logs through the `log` facade; those records reach the
/// subscriber through its default `tracing-log` bridge.
pub fn init_tracing(json_output: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}
