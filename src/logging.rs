// Tracing setup. Filter comes from --log, then COVERCHECK_LOG, then "info".

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV_VAR: &str = "COVERCHECK_LOG";

/// Install the global subscriber. Call once, at startup.
pub fn init(filter_override: Option<&str>) {
    let filter = match filter_override {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}
