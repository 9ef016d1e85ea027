//! Shared helper functions used across CLI subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use evhandler::RegistryConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load registry limits: defaults, then the optional file, then environment.
pub fn load_config(path: Option<&Path>) -> Result<RegistryConfig> {
    let base = match path {
        Some(path) => RegistryConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    let config = base
        .apply_env()
        .context("invalid EVHANDLER_* environment override")?;
    debug!(?config, "effective registry configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_values_are_used() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_lists = 17").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        // Environment overrides are not set in the test environment.
        if std::env::var_os(evhandler::config::ENV_MAX_LISTS).is_none() {
            assert_eq!(config.max_lists, 17);
        }
    }

    #[test]
    fn missing_file_has_context() {
        let err = load_config(Some(Path::new("/nonexistent/evhandler.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
