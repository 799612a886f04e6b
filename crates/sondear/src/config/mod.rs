//! Settings and Configuration
//!
//! All tunables live in one `Settings` struct, resolved once before a
//! request starts and immutable within it. Values arrive from three places,
//! in order: built-in defaults, programmatic configuration (the builder),
//! and the environment override string (`SONDEAR_CONFIG`, see [`env`]).
//!
//! A bad value never aborts loading: the specific setting is rejected with
//! a `Config` error, the previous value is kept, and loading continues.

mod env;

pub use env::{parse_override_pairs, ENV_CONFIG_VAR};

use crate::collectors::Granularity;
use crate::filter::{FilterMode, RuleSpec};
use crate::modes::ModeMask;
use crate::result::{SondearError, SondearResult};
use serde::{Deserialize, Serialize};

/// Default output directory for flush sinks
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp";

/// Resolved configuration for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Active subsystems
    pub mode: ModeMask,
    /// Directory output files are written into
    pub output_dir: String,
    /// Coverage output file name template (`%p` pid, `%t` timestamp,
    /// `%u` microseconds, `%s` script name, `%c` flush counter)
    pub coverage_output_name: String,
    /// Trace output file name template
    pub trace_output_name: String,
    /// Profiler output file name template
    pub profiler_output_name: String,
    /// GC statistics output file name template
    pub gc_stats_output_name: String,
    /// Coverage granularity (line, branch, or path)
    pub coverage_granularity: Granularity,
    /// Also emit one trace record per executed statement (very verbose)
    pub trace_statements: bool,
    /// Maximum function nesting depth before the call hooks stop
    /// descending (guards runaway recursion in the host)
    pub max_nesting_level: u32,
    /// Maximum stack frames reported to collaborators; negative means
    /// unlimited
    pub max_stack_frames: i64,
    /// Debugger client host
    pub remote_host: String,
    /// Debugger client port
    pub remote_port: u16,
    /// Deadline for one cooperative suspension, in milliseconds
    pub remote_timeout_ms: u64,
    /// Record per-call memory delta in trace records
    pub show_mem_delta: bool,
    /// Record return values in trace records
    pub collect_return: bool,
    /// Declared filter mode
    pub filter_mode: FilterMode,
    /// Ordered filter rules
    pub filter_rules: Vec<RuleSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ModeMask::off(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            coverage_output_name: "coverage.%p.%c".to_string(),
            trace_output_name: "trace.%p.%c".to_string(),
            profiler_output_name: "profile.%p.%c".to_string(),
            gc_stats_output_name: "gcstats.%p.%c".to_string(),
            coverage_granularity: Granularity::Line,
            trace_statements: false,
            max_nesting_level: 256,
            max_stack_frames: -1,
            remote_host: "localhost".to_string(),
            remote_port: 9000,
            remote_timeout_ms: 200,
            show_mem_delta: false,
            collect_return: false,
            filter_mode: FilterMode::None,
            filter_rules: Vec::new(),
        }
    }
}

impl Settings {
    /// Create settings with all defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Apply one `key=value` pair.
    ///
    /// Unknown keys and unparseable values are a `Config` error; the
    /// setting keeps its current value.
    pub fn apply(&mut self, key: &str, value: &str) -> SondearResult<()> {
        fn bad(setting: &str, message: impl Into<String>) -> SondearError {
            SondearError::Config {
                setting: setting.to_string(),
                message: message.into(),
            }
        }

        match key {
            "mode" => self.mode = ModeMask::parse(value)?,
            "output_dir" => self.output_dir = value.to_string(),
            "coverage_output_name" => self.coverage_output_name = value.to_string(),
            "trace_output_name" => self.trace_output_name = value.to_string(),
            "profiler_output_name" => self.profiler_output_name = value.to_string(),
            "gc_stats_output_name" => self.gc_stats_output_name = value.to_string(),
            "coverage_granularity" => self.coverage_granularity = Granularity::parse(value)?,
            "trace_statements" => self.trace_statements = parse_bool(key, value)?,
            "max_nesting_level" => {
                self.max_nesting_level = value
                    .parse()
                    .map_err(|_| bad(key, format!("'{value}' is not a non-negative integer")))?;
            }
            "max_stack_frames" => {
                self.max_stack_frames = value
                    .parse()
                    .map_err(|_| bad(key, format!("'{value}' is not an integer")))?;
            }
            "remote_host" => self.remote_host = value.to_string(),
            "remote_port" => {
                self.remote_port = value
                    .parse()
                    .map_err(|_| bad(key, format!("'{value}' is not a port number")))?;
            }
            "remote_timeout_ms" => {
                self.remote_timeout_ms = value
                    .parse()
                    .map_err(|_| bad(key, format!("'{value}' is not a non-negative integer")))?;
            }
            "show_mem_delta" => self.show_mem_delta = parse_bool(key, value)?,
            "collect_return" => self.collect_return = parse_bool(key, value)?,
            "filter_mode" => self.filter_mode = FilterMode::parse(value)?,
            "filter_include" => self.filter_rules.push(RuleSpec::include(value)),
            "filter_exclude" => self.filter_rules.push(RuleSpec::exclude(value)),
            other => return Err(bad(other, "unknown setting")),
        }
        Ok(())
    }

    /// Apply many pairs, collecting per-setting failures.
    ///
    /// Failed settings keep their previous values; the returned errors let
    /// the caller surface diagnostics without failing the load.
    pub fn apply_all<'a, I>(&mut self, pairs: I) -> Vec<SondearError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut errors = Vec::new();
        for (key, value) in pairs {
            if let Err(err) = self.apply(key, value) {
                tracing::warn!(key, value, error = %err, "rejecting configuration setting");
                errors.push(err);
            }
        }
        errors
    }

    /// Apply the environment override string (space-separated `key=value`
    /// pairs). Malformed pairs are silently skipped; invalid values are
    /// rejected per setting like any other source.
    pub fn apply_override_str(&mut self, overrides: &str) -> Vec<SondearError> {
        let pairs = parse_override_pairs(overrides);
        self.apply_all(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Apply overrides from the `SONDEAR_CONFIG` environment variable, if set
    pub fn apply_env_overrides(&mut self) -> Vec<SondearError> {
        match std::env::var(ENV_CONFIG_VAR) {
            Ok(value) => self.apply_override_str(&value),
            Err(_) => Vec::new(),
        }
    }
}

fn parse_bool(setting: &str, value: &str) -> SondearResult<bool> {
    match value {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(SondearError::Config {
            setting: setting.to_string(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

/// Builder for [`Settings`]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Set the active modes
    #[must_use]
    pub fn mode(mut self, mode: ModeMask) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.settings.output_dir = dir.into();
        self
    }

    /// Set the coverage output file name template
    #[must_use]
    pub fn coverage_output_name(mut self, template: impl Into<String>) -> Self {
        self.settings.coverage_output_name = template.into();
        self
    }

    /// Set the trace output file name template
    #[must_use]
    pub fn trace_output_name(mut self, template: impl Into<String>) -> Self {
        self.settings.trace_output_name = template.into();
        self
    }

    /// Set the profiler output file name template
    #[must_use]
    pub fn profiler_output_name(mut self, template: impl Into<String>) -> Self {
        self.settings.profiler_output_name = template.into();
        self
    }

    /// Set the coverage granularity
    #[must_use]
    pub fn coverage_granularity(mut self, granularity: Granularity) -> Self {
        self.settings.coverage_granularity = granularity;
        self
    }

    /// Also emit a trace record per executed statement
    #[must_use]
    pub fn trace_statements(mut self, enabled: bool) -> Self {
        self.settings.trace_statements = enabled;
        self
    }

    /// Set the maximum nesting level
    #[must_use]
    pub fn max_nesting_level(mut self, level: u32) -> Self {
        self.settings.max_nesting_level = level;
        self
    }

    /// Set the debugger endpoint
    #[must_use]
    pub fn remote(mut self, host: impl Into<String>, port: u16) -> Self {
        self.settings.remote_host = host.into();
        self.settings.remote_port = port;
        self
    }

    /// Set the cooperative-suspension deadline
    #[must_use]
    pub fn remote_timeout_ms(mut self, ms: u64) -> Self {
        self.settings.remote_timeout_ms = ms;
        self
    }

    /// Record per-call memory deltas in traces
    #[must_use]
    pub fn show_mem_delta(mut self, enabled: bool) -> Self {
        self.settings.show_mem_delta = enabled;
        self
    }

    /// Record return values in traces
    #[must_use]
    pub fn collect_return(mut self, enabled: bool) -> Self {
        self.settings.collect_return = enabled;
        self
    }

    /// Set the filter mode and rules
    #[must_use]
    pub fn filter(mut self, mode: FilterMode, rules: Vec<RuleSpec>) -> Self {
        self.settings.filter_mode = mode;
        self.settings.filter_rules = rules;
        self
    }

    /// Build the settings
    #[must_use]
    pub fn build(self) -> Settings {
        self.settings
    }
}
