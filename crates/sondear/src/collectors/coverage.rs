//! Coverage Collector
//!
//! The statement-hook side of coverage: every executed statement increments
//! the owning unit's line table. Branch and path events arrive through the
//! opcode-override path ([`RequestContext::on_branch`] and
//! [`RequestContext::on_path`](crate::pipeline::RequestContext::on_path))
//! and are gated by the configured granularity.
//!
//! [`RequestContext::on_branch`]: crate::pipeline::RequestContext::on_branch

use crate::registry::UnitRegistry;
use crate::result::{SondearError, SondearResult};
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};

/// Coverage granularity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Per-line hit counts (default)
    #[default]
    Line,
    /// Line counts plus per-branch-target counts
    Branch,
    /// Branch counts plus distinct path signatures; the most expensive
    /// mode, trades memory for precision, opt-in only
    Path,
}

impl Granularity {
    /// Parse a granularity name from configuration
    pub fn parse(value: &str) -> SondearResult<Self> {
        match value {
            "line" => Ok(Self::Line),
            "branch" => Ok(Self::Branch),
            "path" => Ok(Self::Path),
            other => Err(SondearError::Config {
                setting: "coverage_granularity".to_string(),
                message: format!("'{other}' is not a granularity (line, branch, path)"),
            }),
        }
    }

    /// True if branch events are recorded at this granularity
    #[must_use]
    pub const fn records_branches(self) -> bool {
        matches!(self, Self::Branch | Self::Path)
    }

    /// True if path signatures are recorded at this granularity
    #[must_use]
    pub const fn records_paths(self) -> bool {
        matches!(self, Self::Path)
    }
}

/// Collector for the coverage mode
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageCollector {
    granularity: Granularity,
}

impl CoverageCollector {
    /// Create a line-granularity collector
    #[must_use]
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    /// Configured granularity
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Record one executed statement
    pub fn on_statement(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        line: u32,
    ) -> SondearResult<()> {
        registry.record_line(unit, line)
    }

    /// Record a taken branch, if the granularity includes branches
    pub fn on_branch(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        line: u32,
        target: u32,
    ) -> SondearResult<()> {
        if self.granularity.records_branches() {
            registry.record_branch(unit, line, target)?;
        }
        Ok(())
    }

    /// Record a completed path signature, if the granularity includes paths
    pub fn on_path(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        signature: u64,
    ) -> SondearResult<()> {
        if self.granularity.records_paths() {
            registry.record_path(unit, signature)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::unit::{UnitDescriptor, UnitIdentity};

    fn setup() -> (UnitRegistry, UnitId) {
        let mut registry = UnitRegistry::new();
        let id = registry.register(
            UnitDescriptor::new(UnitIdentity::file("/app/a.php", 1, 10)),
            &FilterSet::none(),
        );
        (registry, id)
    }

    #[test]
    fn test_statement_records_line() {
        let (mut registry, id) = setup();
        let mut coverage = CoverageCollector::new(Granularity::Line);
        coverage.on_statement(&mut registry, id, 5).unwrap();
        coverage.on_statement(&mut registry, id, 5).unwrap();
        assert_eq!(registry.lookup(id).unwrap().lines().get(5), 2);
    }

    #[test]
    fn test_line_granularity_ignores_branches_and_paths() {
        let (mut registry, id) = setup();
        let mut coverage = CoverageCollector::new(Granularity::Line);
        coverage.on_branch(&mut registry, id, 5, 9).unwrap();
        coverage.on_path(&mut registry, id, 0xfeed).unwrap();
        let unit = registry.lookup(id).unwrap();
        assert!(unit.branches().is_empty());
        assert!(unit.paths().is_empty());
    }

    #[test]
    fn test_branch_granularity_records_branches_not_paths() {
        let (mut registry, id) = setup();
        let mut coverage = CoverageCollector::new(Granularity::Branch);
        coverage.on_branch(&mut registry, id, 5, 9).unwrap();
        coverage.on_path(&mut registry, id, 0xfeed).unwrap();
        let unit = registry.lookup(id).unwrap();
        assert_eq!(unit.branches().get(5, 9), 1);
        assert!(unit.paths().is_empty());
    }

    #[test]
    fn test_path_granularity_records_everything() {
        let (mut registry, id) = setup();
        let mut coverage = CoverageCollector::new(Granularity::Path);
        coverage.on_statement(&mut registry, id, 2).unwrap();
        coverage.on_branch(&mut registry, id, 2, 7).unwrap();
        coverage.on_path(&mut registry, id, 0xfeed).unwrap();
        coverage.on_path(&mut registry, id, 0xfeed).unwrap();
        let unit = registry.lookup(id).unwrap();
        assert_eq!(unit.lines().get(2), 1);
        assert_eq!(unit.branches().get(2, 7), 1);
        assert_eq!(unit.paths().distinct(), 1);
    }
}
