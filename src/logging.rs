use crate::config::AppConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the tracing subscriber from the loaded configuration.
///
/// `RUST_LOG` takes precedence over the configured log level so operators can
/// raise verbosity for a single run without touching config files.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
