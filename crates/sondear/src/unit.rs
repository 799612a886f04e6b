//! Execution-Unit Identity
//!
//! An execution unit is the addressable granularity of instrumentation: a
//! compiled function body or an included file. The host compiler reports one
//! descriptor per unit; the registry turns it into a dense arena index.
//!
//! `UnitId` values are intentionally NOT interchangeable with line numbers
//! or call-site ids to catch mix-ups at compile time.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Dense, per-request execution-unit index
///
/// Issued by the registry in compilation order. Valid only for the request
/// that issued it; using a stale id after teardown is an invariant
/// violation, not undefined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitId(u32);

impl UnitId {
    /// Create a unit id from a raw arena index
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the inner value as a usize index
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Hash for UnitId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for UnitId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnitId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Stable identity of an execution unit within one request
///
/// Two units share identity only if every field matches; the registry
/// rejects nothing but deduplicates on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIdentity {
    /// Normalized absolute path of the source file
    pub path: String,
    /// First line of the unit
    pub start_line: u32,
    /// Last line of the unit
    pub end_line: u32,
    /// Enclosing function name, `None` for file/include scope
    pub function: Option<String>,
}

impl UnitIdentity {
    /// Identity for a file-scope unit (top-level/include code)
    #[must_use]
    pub fn file(path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            function: None,
        }
    }

    /// Identity for a function-body unit
    #[must_use]
    pub fn function(
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            function: Some(name.into()),
        }
    }

    /// Label used in output headers: `path` or `path (function)`
    #[must_use]
    pub fn label(&self) -> String {
        match &self.function {
            Some(name) => format!("{} ({})", self.path, name),
            None => self.path.clone(),
        }
    }
}

impl fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.path, self.start_line, self.end_line)?;
        if let Some(name) = &self.function {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

/// Compile-time description of an execution unit, reported by the host
///
/// Carries what the host compiler knows and the engine cannot derive:
/// the unit's identity and which lines inside it hold executable code.
/// The executable-line set is what lets the coverage output distinguish
/// "executable but never hit" (explicit 0) from "not executable" (absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Unit identity
    pub identity: UnitIdentity,
    /// Lines within `start_line..=end_line` that hold executable code,
    /// in ascending order. Empty when the host does not report them.
    #[serde(default)]
    pub executable_lines: Vec<u32>,
}

impl UnitDescriptor {
    /// Create a descriptor with no executable-line information
    #[must_use]
    pub fn new(identity: UnitIdentity) -> Self {
        Self {
            identity,
            executable_lines: Vec::new(),
        }
    }

    /// Attach the host compiler's executable-line analysis
    #[must_use]
    pub fn with_executable_lines(mut self, lines: Vec<u32>) -> Self {
        self.executable_lines = lines;
        self
    }
}
