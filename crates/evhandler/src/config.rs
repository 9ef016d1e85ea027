//! Registry configuration.
//!
//! [`RegistryConfig`] bounds how much memory a [`Registry`](crate::Registry)
//! may claim.  Values come from, in increasing precedence:
//!
//! 1. [`RegistryConfig::default`]
//! 2. a TOML file ([`RegistryConfig::from_file`] / [`RegistryConfig::from_toml_str`])
//! 3. `EVHANDLER_*` environment variables ([`RegistryConfig::apply_env`])
//!
//! ```toml
//! max_lists = 256
//! max_handlers_per_list = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Environment variable overriding [`RegistryConfig::max_lists`].
pub const ENV_MAX_LISTS: &str = "EVHANDLER_MAX_LISTS";

/// Environment variable overriding [`RegistryConfig::max_handlers_per_list`].
pub const ENV_MAX_HANDLERS_PER_LIST: &str = "EVHANDLER_MAX_HANDLERS_PER_LIST";

/// Capacity limits applied by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Maximum number of named lists the directory will create.
    pub max_lists: usize,
    /// Maximum number of handlers (live or retired) linked into one list.
    pub max_handlers_per_list: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_lists: 4096,
            max_handlers_per_list: 65_536,
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from TOML text.  Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "registry configuration loaded");
        Ok(config)
    }

    /// Apply `EVHANDLER_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply overrides from an arbitrary key/value source.
    ///
    /// Unrelated keys are ignored; a recognised key with a non-numeric value
    /// is an error.
    pub fn apply_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let slot = match key.as_ref() {
                ENV_MAX_LISTS => &mut self.max_lists,
                ENV_MAX_HANDLERS_PER_LIST => &mut self.max_handlers_per_list,
                _ => continue,
            };
            *slot = value
                .as_ref()
                .trim()
                .parse()
                .map_err(|e| RegistryError::InvalidConfig {
                    reason: format!("{}={:?}: {e}", key.as_ref(), value.as_ref()),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject limits that would make every registration fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_lists == 0 {
            return Err(RegistryError::InvalidConfig {
                reason: "max_lists must be at least 1".into(),
            });
        }
        if self.max_handlers_per_list == 0 {
            return Err(RegistryError::InvalidConfig {
                reason: "max_handlers_per_list must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> String {
        // Two plain integer fields always serialize.
        toml::to_string(self).unwrap_or_default()
    }
}
