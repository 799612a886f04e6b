//! Coverage Listing Inspector
//!
//! Parses a native coverage file and prints a per-unit summary table with
//! hit/found counts and a percentage.

use crate::error::CliResult;
use console::style;
use sondear::format::coverage::{self, ParsedUnit};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Per-unit line coverage summary
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSummary {
    /// Unit label (path, or `path::function`)
    pub label: String,
    /// Executable lines with at least one hit
    pub lines_hit: u64,
    /// Executable lines recorded
    pub lines_found: u64,
}

impl UnitSummary {
    /// Percentage of recorded lines that were hit, 100 when none recorded
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.lines_found == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.lines_hit as f64 / self.lines_found as f64 * 100.0
            }
        }
    }
}

/// Summarize parsed units in listing order
#[must_use]
pub fn summarize(units: &[ParsedUnit]) -> Vec<UnitSummary> {
    units
        .iter()
        .map(|unit| UnitSummary {
            label: unit.identity.label(),
            lines_hit: unit.lines.iter().filter(|(_, count)| *count > 0).count() as u64,
            lines_found: unit.lines.len() as u64,
        })
        .collect()
}

/// Render the summary table shown to the user
#[must_use]
pub fn render_table(summaries: &[UnitSummary]) -> String {
    let mut out = String::new();
    let mut total_hit = 0u64;
    let mut total_found = 0u64;
    for summary in summaries {
        let percent = summary.percent();
        let colored = if percent >= 80.0 {
            style(format!("{percent:6.1}%")).green()
        } else if percent >= 50.0 {
            style(format!("{percent:6.1}%")).yellow()
        } else {
            style(format!("{percent:6.1}%")).red()
        };
        let _ = writeln!(
            out,
            "{colored}  {:>5}/{:<5}  {}",
            summary.lines_hit, summary.lines_found, summary.label
        );
        total_hit += summary.lines_hit;
        total_found += summary.lines_found;
    }
    let total = UnitSummary {
        label: String::new(),
        lines_hit: total_hit,
        lines_found: total_found,
    };
    let _ = writeln!(
        out,
        "{}  {:>5}/{:<5}  {}",
        style(format!("{:6.1}%", total.percent())).bold(),
        total_hit,
        total_found,
        style("total").bold()
    );
    out
}

/// Inspect a coverage file and print its summary to stdout
pub fn run(input: &Path) -> CliResult<()> {
    let text = fs::read_to_string(input)?;
    let units = coverage::parse(&text)?;
    if units.is_empty() {
        println!("{}", style("no complete unit blocks").dim());
        return Ok(());
    }
    print!("{}", render_table(&summarize(&units)));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sondear::unit::UnitIdentity;

    fn unit(path: &str, lines: Vec<(u32, u64)>) -> ParsedUnit {
        ParsedUnit {
            identity: UnitIdentity::file(path, 1, 10),
            lines,
            branches: Vec::new(),
            distinct_paths: 0,
        }
    }

    #[test]
    fn test_summarize_counts_hit_and_found() {
        let summaries = summarize(&[unit("/app/a.php", vec![(1, 2), (2, 0), (3, 1)])]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].lines_hit, 2);
        assert_eq!(summaries[0].lines_found, 3);
    }

    #[test]
    fn test_percent_of_empty_unit_is_full() {
        let summaries = summarize(&[unit("/app/empty.php", Vec::new())]);
        assert!((summaries[0].percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_table_ends_with_total_row() {
        let table = render_table(&summarize(&[
            unit("/app/a.php", vec![(1, 1)]),
            unit("/app/b.php", vec![(1, 0)]),
        ]));
        let last = table.lines().last().unwrap();
        assert!(last.contains("1/2"));
        assert!(last.contains("total"));
    }
}
