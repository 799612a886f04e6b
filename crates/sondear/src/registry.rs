//! Execution-Unit Registry
//!
//! Maps each compiled execution unit to a dense per-request index and a
//! mutable instrumentation record. Units live in an arena owned by the
//! request context; ids are plain indices, so there are no pointers into
//! host-engine structures to go stale across the abort-safe flush path.
//!
//! Insertion order is compilation order and is preserved through to
//! output: two requests that compile the same units in the same order
//! produce identically ordered output.

use crate::filter::FilterSet;
use crate::hits::{BranchTable, LineTable, PathSet, UnitSnapshot};
use crate::result::{SondearError, SondearResult};
use crate::unit::{UnitDescriptor, UnitId, UnitIdentity};
use std::collections::HashMap;

/// Per-request instrumentation record for one execution unit
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    identity: UnitIdentity,
    executable_lines: Vec<u32>,
    eligible: bool,
    compiled: bool,
    lines: LineTable,
    branches: BranchTable,
    paths: PathSet,
}

impl ExecutionUnit {
    fn new(descriptor: UnitDescriptor, eligible: bool) -> Self {
        Self {
            identity: descriptor.identity,
            executable_lines: descriptor.executable_lines,
            eligible,
            compiled: false,
            lines: LineTable::new(),
            branches: BranchTable::new(),
            paths: PathSet::new(),
        }
    }

    /// Unit identity
    #[must_use]
    pub fn identity(&self) -> &UnitIdentity {
        &self.identity
    }

    /// Cached eligibility decision, immutable for the request's duration
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.eligible
    }

    /// True once the host finished compiling the unit
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Line hit table
    #[must_use]
    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    /// Branch hit table
    #[must_use]
    pub fn branches(&self) -> &BranchTable {
        &self.branches
    }

    /// Path signature set
    #[must_use]
    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    /// Immutable view for the writer; zero-fills from the executable set
    #[must_use]
    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot::build(
            self.identity.clone(),
            &self.executable_lines,
            &self.lines,
            &self.branches,
            &self.paths,
        )
    }
}

/// Per-request registry of execution units
///
/// Exclusively owned by one request context; never shared across
/// concurrent requests, so no interior locking.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: Vec<ExecutionUnit>,
    index: HashMap<UnitIdentity, UnitId>,
}

impl UnitRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, returning its id.
    ///
    /// Idempotent: an identity already present returns the existing id
    /// without re-running the filter and without touching hit data
    /// (recursion and repeated includes re-enter the same unit). The one
    /// filter evaluation per identity happens here.
    pub fn register(&mut self, descriptor: UnitDescriptor, filter: &FilterSet) -> UnitId {
        if let Some(id) = self.index.get(&descriptor.identity) {
            return *id;
        }

        let eligible = filter.is_eligible(&descriptor.identity);
        let id = UnitId::new(self.units.len() as u32);
        self.index.insert(descriptor.identity.clone(), id);
        self.units.push(ExecutionUnit::new(descriptor, eligible));
        id
    }

    /// Mark a unit as fully compiled; until then the writer skips it
    pub fn mark_compiled(&mut self, id: UnitId) -> SondearResult<()> {
        let unit = self.get_mut(id)?;
        unit.compiled = true;
        Ok(())
    }

    /// Look up a unit by id
    pub fn lookup(&self, id: UnitId) -> SondearResult<&ExecutionUnit> {
        self.units
            .get(id.index())
            .ok_or_else(|| SondearError::invariant(format!("stale unit id {id}")))
    }

    fn get_mut(&mut self, id: UnitId) -> SondearResult<&mut ExecutionUnit> {
        self.units
            .get_mut(id.index())
            .ok_or_else(|| SondearError::invariant(format!("stale unit id {id}")))
    }

    /// Look up an id by identity
    #[must_use]
    pub fn find(&self, identity: &UnitIdentity) -> Option<UnitId> {
        self.index.get(identity).copied()
    }

    /// Record one execution of `line` in the unit.
    ///
    /// Ineligible units are a silent no-op (the filter decision is final);
    /// a stale id is an invariant violation.
    pub fn record_line(&mut self, id: UnitId, line: u32) -> SondearResult<()> {
        let unit = self.get_mut(id)?;
        if unit.eligible {
            unit.lines.record(line);
        }
        Ok(())
    }

    /// Record a taken branch from `line` to `target`
    pub fn record_branch(&mut self, id: UnitId, line: u32, target: u32) -> SondearResult<()> {
        let unit = self.get_mut(id)?;
        if unit.eligible {
            unit.branches.record(line, target);
        }
        Ok(())
    }

    /// Record a distinct path signature
    pub fn record_path(&mut self, id: UnitId, signature: u64) -> SondearResult<()> {
        let unit = self.get_mut(id)?;
        if unit.eligible {
            unit.paths.record(signature);
        }
        Ok(())
    }

    /// Units in insertion (compilation) order
    pub fn all(&self) -> impl Iterator<Item = &ExecutionUnit> {
        self.units.iter()
    }

    /// Snapshots of every eligible, fully compiled unit, in insertion
    /// order. Units still mid-registration when an abort hits produce no
    /// record rather than a fabricated one.
    pub fn snapshots(&self) -> impl Iterator<Item = UnitSnapshot> + '_ {
        self.units
            .iter()
            .filter(|unit| unit.eligible && unit.compiled)
            .map(ExecutionUnit::snapshot)
    }

    /// Number of registered units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True if nothing has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Drop all units at request teardown
    pub fn clear(&mut self) {
        self.units.clear();
        self.index.clear();
    }
}
