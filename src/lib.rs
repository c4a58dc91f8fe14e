pub mod agent;
pub mod automation;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;

use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Safe to call twice.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the config file, falling back to in-memory defaults (never overwriting
/// a file that failed to parse), then validate it.
pub fn load_effective_config() -> error::Result<config::PilotConfig> {
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}. Using in-memory defaults (not saving).", e);
            config::PilotConfig::default()
        }
    };
    config::validate_config(&config)?;
    Ok(config)
}
