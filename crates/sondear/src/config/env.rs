//! Environment Override Parsing
//!
//! One environment variable carries space-separated `key=value` pairs that
//! override configuration before request start:
//!
//! ```text
//! SONDEAR_CONFIG="remote_port=9003 remote_host=10.0.0.5"
//! ```
//!
//! Malformed pairs (missing `=`, empty value) are silently skipped, never
//! fatal: a half-typed override in a shell must not take down the host.

/// Name of the override environment variable
pub const ENV_CONFIG_VAR: &str = "SONDEAR_CONFIG";

/// Split an override string into well-formed `(key, value)` pairs.
///
/// A pair is kept only if it contains `=` with a non-empty key and a
/// non-empty value. Everything else is dropped without comment.
#[must_use]
pub fn parse_override_pairs(overrides: &str) -> Vec<(String, String)> {
    overrides
        .split(' ')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
