//! Profile Rendering
//!
//! Tabular listing of the profile report, one row per call site, already
//! ordered by the collector (inclusive time descending). Times are printed
//! in microseconds; nanosecond precision is kept internally but is noise
//! in a wall-clock report.

use crate::collectors::ProfileReport;
use std::fmt::Write;

/// Render the profile report as aligned text
#[must_use]
pub fn render(report: &ProfileReport) -> String {
    let mut out = String::from("calls  inclusive_us  exclusive_us  call site\n");
    for (site, stats) in &report.entries {
        let _ = writeln!(
            out,
            "{:>5}  {:>12}  {:>12}  {}() {}:{}",
            stats.calls,
            stats.inclusive_ns / 1_000,
            stats.exclusive_ns / 1_000,
            site.function,
            site.file,
            site.line
        );
    }
    out
}
