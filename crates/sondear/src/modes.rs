//! Mode Mask and Dispatch Order
//!
//! A request activates some subset of the six subsystems. The set is
//! computed once from configuration before the request starts and is
//! immutable afterwards; every hot-path hook consults it with a single
//! masked branch.

use crate::result::{SondearError, SondearResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently-activatable subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Development aids (enhanced diagnostics)
    Develop,
    /// Code coverage collection
    Coverage,
    /// Execution tracing
    Trace,
    /// Statistical profiling
    Profile,
    /// Garbage-collector statistics
    GcStats,
    /// Step debugging over the wire protocol
    Debug,
}

impl Mode {
    const ALL: [Mode; 6] = [
        Mode::Develop,
        Mode::Coverage,
        Mode::Trace,
        Mode::Profile,
        Mode::GcStats,
        Mode::Debug,
    ];

    const fn bit(self) -> u8 {
        match self {
            Mode::Develop => 1 << 0,
            Mode::Coverage => 1 << 1,
            Mode::Trace => 1 << 2,
            Mode::Profile => 1 << 3,
            Mode::GcStats => 1 << 4,
            Mode::Debug => 1 << 5,
        }
    }

    /// Setting-value name of the mode
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Mode::Develop => "develop",
            Mode::Coverage => "coverage",
            Mode::Trace => "trace",
            Mode::Profile => "profile",
            Mode::GcStats => "gcstats",
            Mode::Debug => "debug",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "develop" => Some(Mode::Develop),
            "coverage" => Some(Mode::Coverage),
            "trace" => Some(Mode::Trace),
            "profile" => Some(Mode::Profile),
            "gcstats" => Some(Mode::GcStats),
            "debug" => Some(Mode::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable-after-request-start bitmask of active modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeMask(u8);

impl ModeMask {
    /// Mask with no modes active ("off")
    #[must_use]
    pub const fn off() -> Self {
        Self(0)
    }

    /// Mask with a single mode active
    #[must_use]
    pub const fn only(mode: Mode) -> Self {
        Self(mode.bit())
    }

    /// Add a mode to the mask
    #[must_use]
    pub const fn with(self, mode: Mode) -> Self {
        Self(self.0 | mode.bit())
    }

    /// True if the given mode is active. O(1), a single masked test.
    #[inline]
    #[must_use]
    pub const fn is_active(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// True if no mode is active
    #[must_use]
    pub const fn is_off(self) -> bool {
        self.0 == 0
    }

    /// Parse the comma-separated `mode` setting value.
    ///
    /// `"off"` on its own yields an empty mask; unknown names are a
    /// `Config` error and reject the whole value (the caller keeps the
    /// previous mask).
    pub fn parse(value: &str) -> SondearResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "off" {
            return Ok(Self::off());
        }

        let mut mask = Self::off();
        for part in trimmed.split(',') {
            let name = part.trim();
            match Mode::from_name(name) {
                Some(mode) => mask = mask.with(mode),
                None => {
                    return Err(SondearError::Config {
                        setting: "mode".to_string(),
                        message: format!("unknown mode '{name}'"),
                    })
                }
            }
        }
        Ok(mask)
    }

    /// Active modes in *dispatch order*: coverage always comes last.
    ///
    /// Coverage fully overrides opcode handling, so its collector must be
    /// installed after every other subsystem; installing it earlier would
    /// let a later installer silently mask the override. This ordering is a
    /// correctness property, not a convention.
    #[must_use]
    pub fn dispatch_order(self) -> Vec<Mode> {
        let mut order: Vec<Mode> = Mode::ALL
            .iter()
            .copied()
            .filter(|mode| *mode != Mode::Coverage && self.is_active(*mode))
            .collect();
        if self.is_active(Mode::Coverage) {
            order.push(Mode::Coverage);
        }
        order
    }
}

impl fmt::Display for ModeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_off() {
            return f.write_str("off");
        }
        let names: Vec<&str> = Mode::ALL
            .iter()
            .filter(|mode| self.is_active(**mode))
            .map(|mode| mode.name())
            .collect();
        f.write_str(&names.join(","))
    }
}
