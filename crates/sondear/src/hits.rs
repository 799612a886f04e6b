//! Hit-Table Engine
//!
//! Per-unit counters for line, branch, and path coverage. All counters are
//! unsigned 64-bit and saturate at `u64::MAX` instead of wrapping; a wrapped
//! counter would silently report a hot line as cold, which is the worst
//! possible failure mode for a coverage tool.
//!
//! Tables are keyed with `BTreeMap` so snapshot iteration is in ascending
//! line order without a sort pass, keeping output deterministic.

use crate::unit::UnitIdentity;
use std::collections::{BTreeMap, BTreeSet};

/// Per-line execution counters for one unit
///
/// An entry is zero-initialized on first touch and only ever incremented.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    counts: BTreeMap<u32, u64>,
}

impl LineTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one execution of `line`.
    ///
    /// Saturates at `u64::MAX`. O(log n) in the number of distinct lines,
    /// O(1) amortized across a request since the working set of lines is
    /// fixed after the first pass over the unit.
    #[inline]
    pub fn record(&mut self, line: u32) {
        let count = self.counts.entry(line).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Add `hits` executions of `line`, saturating
    pub fn add(&mut self, line: u32, hits: u64) {
        let count = self.counts.entry(line).or_insert(0);
        *count = count.saturating_add(hits);
    }

    /// Current count for `line` (0 if never touched)
    #[must_use]
    pub fn get(&self, line: u32) -> u64 {
        self.counts.get(&line).copied().unwrap_or(0)
    }

    /// Number of distinct lines touched
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no line has been touched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(line, count)` in ascending line order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.counts.iter().map(|(line, count)| (*line, *count))
    }

    /// Merge another table into this one, saturating per line
    pub fn merge(&mut self, other: &LineTable) {
        for (line, hits) in other.iter() {
            self.add(line, hits);
        }
    }
}

/// Per-branch execution counters, keyed by `(line, branch target line)`
#[derive(Debug, Clone, Default)]
pub struct BranchTable {
    counts: BTreeMap<(u32, u32), u64>,
}

impl BranchTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one taken branch from `line` to `target`, saturating
    #[inline]
    pub fn record(&mut self, line: u32, target: u32) {
        let count = self.counts.entry((line, target)).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Current count for the `(line, target)` branch
    #[must_use]
    pub fn get(&self, line: u32, target: u32) -> u64 {
        self.counts.get(&(line, target)).copied().unwrap_or(0)
    }

    /// Number of distinct branches taken
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no branch has been taken
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `((line, target), count)` in key order
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), u64)> + '_ {
        self.counts.iter().map(|(key, count)| (*key, *count))
    }
}

/// Distinct path signatures for one unit (path-coverage mode)
///
/// Path coverage counts distinct control-flow paths, not executions, so
/// this is a set rather than a counter table. It trades memory for
/// precision and is opt-in only.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    signatures: BTreeSet<u64>,
}

impl PathSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path signature; returns true if it was new
    pub fn record(&mut self, signature: u64) -> bool {
        self.signatures.insert(signature)
    }

    /// Number of distinct paths observed
    #[must_use]
    pub fn distinct(&self) -> u64 {
        self.signatures.len() as u64
    }

    /// True if a signature has been observed
    #[must_use]
    pub fn contains(&self, signature: u64) -> bool {
        self.signatures.contains(&signature)
    }

    /// True if no path has been observed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Immutable view of one unit's hit data, extracted for the writer
///
/// Line entries are pre-merged with the unit's executable-line set: every
/// executable line appears, with an explicit 0 when never hit. Lines the
/// host did not mark executable but that recorded hits anyway are kept
/// (the host's analysis is advisory, the counters are ground truth).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    /// Identity of the snapshotted unit
    pub identity: UnitIdentity,
    /// `(line, count)` in ascending line order, zero-filled from the
    /// executable-line set
    pub lines: Vec<(u32, u64)>,
    /// `((line, target), count)` in key order; empty unless branch mode ran
    pub branches: Vec<((u32, u32), u64)>,
    /// Number of distinct paths; 0 unless path mode ran
    pub distinct_paths: u64,
}

impl UnitSnapshot {
    /// Build a snapshot from raw tables and the executable-line set
    #[must_use]
    pub fn build(
        identity: UnitIdentity,
        executable_lines: &[u32],
        lines: &LineTable,
        branches: &BranchTable,
        paths: &PathSet,
    ) -> Self {
        let mut merged: BTreeMap<u32, u64> =
            executable_lines.iter().map(|line| (*line, 0)).collect();
        for (line, count) in lines.iter() {
            let entry = merged.entry(line).or_insert(0);
            *entry = entry.saturating_add(count);
        }

        Self {
            identity,
            lines: merged.into_iter().collect(),
            branches: branches.iter().collect(),
            distinct_paths: paths.distinct(),
        }
    }

    /// Number of lines with at least one hit
    #[must_use]
    pub fn lines_hit(&self) -> usize {
        self.lines.iter().filter(|(_, count)| *count > 0).count()
    }

    /// Total number of line entries (hit or not)
    #[must_use]
    pub fn lines_found(&self) -> usize {
        self.lines.len()
    }
}
