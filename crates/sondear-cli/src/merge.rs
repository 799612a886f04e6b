//! Coverage Merge
//!
//! Combines coverage listings from several requests into one, summing hit
//! counts per unit. Output is the native listing by default; `--lcov`
//! exports the merged data as an LCOV tracefile instead.

use crate::error::{CliError, CliResult};
use sondear::format::coverage::{self, ParsedUnit};
use sondear::format::lcov;
use sondear::hits::UnitSnapshot;
use std::fs;
use std::path::{Path, PathBuf};

/// Output flavor for the merged data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeFormat {
    /// Native coverage listing
    #[default]
    Native,
    /// LCOV tracefile
    Lcov,
}

/// Merge the given coverage files and render the result
pub fn merge_files(inputs: &[PathBuf], format: MergeFormat) -> CliResult<String> {
    if inputs.is_empty() {
        return Err(CliError::invalid_argument(
            "merge needs at least one input file",
        ));
    }
    let mut listings = Vec::with_capacity(inputs.len());
    for input in inputs {
        let text = fs::read_to_string(input)?;
        listings.push(coverage::parse(&text)?);
    }
    let merged = coverage::merge(listings);
    Ok(render(&merged, format))
}

fn render(units: &[ParsedUnit], format: MergeFormat) -> String {
    match format {
        MergeFormat::Native => {
            let mut out = coverage::render_header();
            for unit in units {
                out.push_str(&coverage::render_block(&to_snapshot(unit)));
            }
            out
        }
        MergeFormat::Lcov => {
            let snapshots: Vec<UnitSnapshot> = units.iter().map(to_snapshot).collect();
            lcov::render(&snapshots)
        }
    }
}

fn to_snapshot(unit: &ParsedUnit) -> UnitSnapshot {
    UnitSnapshot {
        identity: unit.identity.clone(),
        lines: unit.lines.clone(),
        branches: unit.branches.clone(),
        distinct_paths: unit.distinct_paths,
    }
}

/// Merge coverage files and write the result to `output`
pub fn run(inputs: &[PathBuf], output: &Path, format: MergeFormat) -> CliResult<()> {
    let rendered = merge_files(inputs, format)?;
    fs::write(output, rendered)?;
    Ok(())
}
