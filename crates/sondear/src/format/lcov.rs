//! LCOV Export
//!
//! Renders coverage snapshots in the LCOV tracefile format consumed by
//! `genhtml` and most CI coverage gates. Snapshots are grouped by source
//! file; function-scoped units contribute `FN`/`FNDA` rows to the file
//! section they belong to. Line counts for the same file are combined with
//! saturating addition.

use crate::hits::UnitSnapshot;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Render snapshots as an LCOV tracefile.
///
/// A function unit's execution count is approximated by the count of its
/// first executable line, which is exact for any function entered at its
/// top.
#[must_use]
pub fn render(snapshots: &[UnitSnapshot]) -> String {
    let mut files: Vec<&str> = Vec::new();
    for snapshot in snapshots {
        if !files.contains(&snapshot.identity.path.as_str()) {
            files.push(&snapshot.identity.path);
        }
    }

    let mut out = String::from("TN:\n");
    for file in files {
        render_file(&mut out, file, snapshots);
    }
    out
}

fn render_file(out: &mut String, file: &str, snapshots: &[UnitSnapshot]) {
    let _ = writeln!(out, "SF:{file}");

    let mut functions: Vec<(&str, u32, u64)> = Vec::new();
    let mut lines: BTreeMap<u32, u64> = BTreeMap::new();
    for snapshot in snapshots.iter().filter(|s| s.identity.path == file) {
        if let Some(function) = &snapshot.identity.function {
            let entered = snapshot.lines.first().map_or(0, |(_, count)| *count);
            functions.push((function, snapshot.identity.start_line, entered));
        }
        for (line, count) in &snapshot.lines {
            let total = lines.entry(*line).or_insert(0);
            *total = total.saturating_add(*count);
        }
    }

    for (function, start_line, _) in &functions {
        let _ = writeln!(out, "FN:{start_line},{function}");
    }
    for (function, _, entered) in &functions {
        let _ = writeln!(out, "FNDA:{entered},{function}");
    }
    let _ = writeln!(out, "FNF:{}", functions.len());
    let _ = writeln!(
        out,
        "FNH:{}",
        functions.iter().filter(|(_, _, entered)| *entered > 0).count()
    );

    for (line, count) in &lines {
        let _ = writeln!(out, "DA:{line},{count}");
    }
    let _ = writeln!(out, "LF:{}", lines.len());
    let _ = writeln!(out, "LH:{}", lines.values().filter(|count| **count > 0).count());
    out.push_str("end_of_record\n");
}
