//! GC Statistics Rendering
//!
//! One row per collector cycle plus an aggregate footer.

use crate::collectors::GcStatsCollector;
use std::fmt::Write;

/// Render the GC cycle table and summary footer
#[must_use]
pub fn render(collector: &GcStatsCollector) -> String {
    let mut out = String::from("collected  duration_us  mem_before  mem_after  reclaimed\n");
    for cycle in collector.cycles() {
        let _ = writeln!(
            out,
            "{:>9}  {:>11}  {:>10}  {:>9}  {:>9}",
            cycle.collected,
            cycle.duration_us,
            cycle.memory_before,
            cycle.memory_after,
            cycle.reclaimed()
        );
    }
    let summary = collector.summary();
    let _ = writeln!(
        out,
        "runs: {}  collected: {}  total_duration_us: {}",
        summary.runs, summary.collected, summary.total_duration_us
    );
    out
}
