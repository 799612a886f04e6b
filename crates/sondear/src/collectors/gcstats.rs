//! Garbage-Collector Statistics
//!
//! One row per collector run, reported by the host through the
//! `on_gc_cycle` hook. Purely accumulative; rendered to its own sink at
//! flush.

use serde::{Deserialize, Serialize};

/// Host report of one completed GC cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcCycle {
    /// Objects collected in this cycle
    pub collected: u64,
    /// Cycle duration in microseconds
    pub duration_us: u64,
    /// Heap bytes before the cycle
    pub memory_before: u64,
    /// Heap bytes after the cycle
    pub memory_after: u64,
}

impl GcCycle {
    /// Bytes reclaimed (0 if the heap grew during the cycle)
    #[must_use]
    pub fn reclaimed(&self) -> u64 {
        self.memory_before.saturating_sub(self.memory_after)
    }
}

/// Aggregate over all recorded cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcStatsSummary {
    /// Number of cycles
    pub runs: u64,
    /// Total objects collected
    pub collected: u64,
    /// Total time spent collecting, microseconds
    pub total_duration_us: u64,
}

/// Collector for the gcstats mode
#[derive(Debug, Default)]
pub struct GcStatsCollector {
    cycles: Vec<GcCycle>,
}

impl GcStatsCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one cycle
    pub fn record(&mut self, cycle: GcCycle) {
        self.cycles.push(cycle);
    }

    /// Recorded cycles in arrival order
    #[must_use]
    pub fn cycles(&self) -> &[GcCycle] {
        &self.cycles
    }

    /// Aggregate summary, saturating
    #[must_use]
    pub fn summary(&self) -> GcStatsSummary {
        let mut summary = GcStatsSummary::default();
        for cycle in &self.cycles {
            summary.runs = summary.runs.saturating_add(1);
            summary.collected = summary.collected.saturating_add(cycle.collected);
            summary.total_duration_us =
                summary.total_duration_us.saturating_add(cycle.duration_us);
        }
        summary
    }
}
