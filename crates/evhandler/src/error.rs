//! Registry error types.
//!
//! Runtime failures surface through [`RegistryError`], the single error type
//! returned by every fallible public API in this crate.  Caller bugs (an
//! oversized list name, a handler registered at [`DEAD_PRIORITY`]) are *not*
//! represented here: they are assertions and abort the calling thread.
//!
//! [`DEAD_PRIORITY`]: crate::entry::DEAD_PRIORITY

use std::collections::TryReserveError;
use std::path::PathBuf;

/// Unified error type for the event-handler registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    // -- Capacity errors ----------------------------------------------------
    /// The directory already holds the configured maximum number of lists.
    ///
    /// Nothing was inserted; the directory is unchanged.
    #[error("handler directory is full ({limit} lists)")]
    DirectoryFull {
        /// The configured `max_lists`.
        limit: usize,
    },

    /// The list already holds the configured maximum number of handlers.
    #[error("handler list `{list}` is full ({limit} handlers)")]
    ListFull { list: String, limit: usize },

    /// Growing a list to make room for a new entry failed.
    #[error("failed to allocate handler slot: {0}")]
    Alloc(#[from] TryReserveError),

    // -- Configuration errors -----------------------------------------------
    /// A configuration value is out of range.
    #[error("invalid registry configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A configuration file could not be parsed as TOML.
    #[error("failed to parse registry configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration file could not be read.
    #[error("failed to read configuration file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the registry crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_carry_context() {
        let err = RegistryError::ListFull {
            list: "net.link-up".into(),
            limit: 2,
        };
        assert_eq!(err.to_string(), "handler list `net.link-up` is full (2 handlers)");

        let err = RegistryError::DirectoryFull { limit: 8 };
        assert_eq!(err.to_string(), "handler directory is full (8 lists)");
    }

    #[test]
    fn alloc_errors_convert() {
        let mut v: Vec<u64> = Vec::new();
        let reserve_err = v.try_reserve(usize::MAX).expect_err("must overflow");
        let err: RegistryError = reserve_err.into();
        assert!(matches!(err, RegistryError::Alloc(_)));
    }
}
