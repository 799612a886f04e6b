//! Result and error types for Sondear.
//!
//! The cardinal rule of a diagnostics layer is that it must never be less
//! reliable than the program it observes. Errors in this taxonomy are
//! therefore classified by what the caller is allowed to do about them:
//! configuration and filter errors reject one setting/pattern and continue,
//! I/O errors abort one flush, protocol errors disable step debugging for
//! the rest of the request, and invariant violations degrade to logged
//! no-ops outside of debug builds.

use thiserror::Error;

/// Result type for Sondear operations
pub type SondearResult<T> = Result<T, SondearError>;

/// Errors that can occur in Sondear
#[derive(Debug, Error)]
pub enum SondearError {
    /// Invalid configuration value; the setting keeps its default
    #[error("Invalid value for setting '{setting}': {message}")]
    Config {
        /// Setting name
        setting: String,
        /// Error message
        message: String,
    },

    /// Malformed filter pattern; treated as non-matching
    #[error("Malformed filter pattern '{pattern}': {message}")]
    Filter {
        /// The offending pattern
        pattern: String,
        /// Error message
        message: String,
    },

    /// Malformed output file name template
    #[error("Malformed output template '{template}': {message}")]
    Template {
        /// The offending template
        template: String,
        /// Error message
        message: String,
    },

    /// Malformed remote debugger exchange; step debugging is disabled
    /// for the remainder of the request
    #[error("Debugger protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Programming error inside the core (duplicate identity, stale
    /// handle, skipped state transition)
    #[error("Internal invariant violated: {message}")]
    InvariantViolation {
        /// Error message
        message: String,
    },

    /// Malformed data fed to a reader (coverage file, replay log)
    #[error("Malformed input: {message}")]
    Parse {
        /// Error message
        message: String,
    },

    /// I/O error; aborts the current flush only, never the host
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SondearError {
    /// Build an invariant-violation error.
    ///
    /// Call sites that can only be reached through a core bug pair this
    /// with a `debug_assert!` so development builds fail loudly while
    /// release builds degrade to a logged no-op.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Build a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
