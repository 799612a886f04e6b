//! Native Coverage Listing
//!
//! Line-oriented, one block per execution unit:
//!
//! ```text
//! sondear-coverage 1
//! unit /app/index.php 1 10
//! func main
//! line 1 1
//! line 2 2
//! line 5 3
//! branch 5 9 2
//! paths 4
//! end
//! ```
//!
//! Every executable line appears, with an explicit `0` count when never
//! hit; a line that is absent was not executable. That distinction is the
//! entire value of coverage output and must never collapse.
//!
//! The `end` terminator makes truncation recognizable: readers drop a
//! trailing block with no terminator instead of treating the file as
//! corrupt, which is what lets an aborted flush still yield usable data.

use crate::hits::UnitSnapshot;
use crate::result::{SondearError, SondearResult};
use crate::unit::UnitIdentity;
use std::fmt::Write;

/// File header for the current format version
pub const HEADER: &str = "sondear-coverage 1";

/// Render the file header line
#[must_use]
pub fn render_header() -> String {
    format!("{HEADER}\n")
}

/// Render one unit block, terminator included
#[must_use]
pub fn render_block(snapshot: &UnitSnapshot) -> String {
    let mut out = String::new();
    let identity = &snapshot.identity;
    let _ = writeln!(
        out,
        "unit {} {} {}",
        identity.path, identity.start_line, identity.end_line
    );
    if let Some(function) = &identity.function {
        let _ = writeln!(out, "func {function}");
    }
    for (line, count) in &snapshot.lines {
        let _ = writeln!(out, "line {line} {count}");
    }
    for ((line, target), count) in &snapshot.branches {
        let _ = writeln!(out, "branch {line} {target} {count}");
    }
    if snapshot.distinct_paths > 0 {
        let _ = writeln!(out, "paths {}", snapshot.distinct_paths);
    }
    out.push_str("end\n");
    out
}

/// One parsed unit block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Unit identity
    pub identity: UnitIdentity,
    /// `(line, count)` pairs in file order
    pub lines: Vec<(u32, u64)>,
    /// `((line, target), count)` pairs in file order
    pub branches: Vec<((u32, u32), u64)>,
    /// Distinct path count, 0 when absent
    pub distinct_paths: u64,
}

/// Parse a coverage listing.
///
/// A trailing block without its `end` terminator is dropped (tolerated
/// truncation from an aborted flush); malformed content inside a
/// terminated block is a `Parse` error.
pub fn parse(text: &str) -> SondearResult<Vec<ParsedUnit>> {
    fn bad(message: impl Into<String>) -> SondearError {
        SondearError::Parse {
            message: message.into(),
        }
    }

    let mut lines = text.lines();
    match lines.next() {
        Some(header) if header == HEADER => {}
        Some(other) => return Err(bad(format!("unexpected header '{other}'"))),
        None => return Ok(Vec::new()),
    }

    let mut units = Vec::new();
    let mut open: Option<ParsedUnit> = None;

    for line in lines {
        let mut fields = line.split(' ');
        let keyword = fields.next().unwrap_or("");
        match keyword {
            "unit" => {
                // An unterminated previous block is silently dropped.
                let path = fields.next().ok_or_else(|| bad("unit without path"))?;
                let start: u32 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("unit without start line"))?;
                let end: u32 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("unit without end line"))?;
                open = Some(ParsedUnit {
                    identity: UnitIdentity::file(path, start, end),
                    lines: Vec::new(),
                    branches: Vec::new(),
                    distinct_paths: 0,
                });
            }
            "func" => {
                let unit = open.as_mut().ok_or_else(|| bad("func outside a block"))?;
                unit.identity.function =
                    Some(fields.next().ok_or_else(|| bad("func without name"))?.to_string());
            }
            "line" => {
                let unit = open.as_mut().ok_or_else(|| bad("line outside a block"))?;
                let number: u32 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("line without number"))?;
                let count: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("line without count"))?;
                unit.lines.push((number, count));
            }
            "branch" => {
                let unit = open.as_mut().ok_or_else(|| bad("branch outside a block"))?;
                let source: u32 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("branch without source line"))?;
                let target: u32 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("branch without target"))?;
                let count: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("branch without count"))?;
                unit.branches.push(((source, target), count));
            }
            "paths" => {
                let unit = open.as_mut().ok_or_else(|| bad("paths outside a block"))?;
                unit.distinct_paths = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| bad("paths without count"))?;
            }
            "end" => {
                let unit = open.take().ok_or_else(|| bad("end without a block"))?;
                units.push(unit);
            }
            "" => {}
            other => return Err(bad(format!("unknown keyword '{other}'"))),
        }
    }

    // `open` still holding a block here means the file was truncated
    // mid-record; the complete blocks before it are valid.
    Ok(units)
}

/// Merge parsed listings, saturating per line/branch, preserving the
/// first-seen unit order. This is the cross-request aggregation path;
/// the engine itself never persists data across requests.
#[must_use]
pub fn merge(listings: Vec<Vec<ParsedUnit>>) -> Vec<ParsedUnit> {
    let mut merged: Vec<ParsedUnit> = Vec::new();
    for listing in listings {
        for unit in listing {
            match merged
                .iter_mut()
                .find(|existing| existing.identity == unit.identity)
            {
                Some(existing) => merge_into(existing, &unit),
                None => merged.push(unit),
            }
        }
    }
    merged
}

fn merge_into(existing: &mut ParsedUnit, incoming: &ParsedUnit) {
    for (line, count) in &incoming.lines {
        match existing.lines.iter_mut().find(|(l, _)| l == line) {
            Some((_, total)) => *total = total.saturating_add(*count),
            None => existing.lines.push((*line, *count)),
        }
    }
    existing.lines.sort_unstable_by_key(|(line, _)| *line);

    for (key, count) in &incoming.branches {
        match existing.branches.iter_mut().find(|(k, _)| k == key) {
            Some((_, total)) => *total = total.saturating_add(*count),
            None => existing.branches.push((*key, *count)),
        }
    }
    existing.branches.sort_unstable_by_key(|(key, _)| *key);

    // Distinct-path counts are not additive across runs; the best
    // cross-run statement is the maximum observed.
    existing.distinct_paths = existing.distinct_paths.max(incoming.distinct_paths);
}
