//! Trace Rendering
//!
//! Human-readable trace text: an envelope with wall-clock start/end stamps
//! and one depth-indented row per record. The envelope makes an aborted
//! trace recognizable the same way the coverage terminator does: a file
//! without its `TRACE END` line stopped mid-request.

use crate::collectors::TraceRecord;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const STAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Render the opening envelope line
#[must_use]
pub fn render_start(at: DateTime<Utc>) -> String {
    format!("TRACE START [{}]\n", at.format(STAMP))
}

/// Render the closing envelope line
#[must_use]
pub fn render_end(at: DateTime<Utc>) -> String {
    format!("TRACE END   [{}]\n", at.format(STAMP))
}

/// Render the record rows between the envelope lines
#[must_use]
pub fn render_records(records: &[TraceRecord]) -> String {
    let mut out = String::new();
    for record in records {
        render_record(&mut out, record);
    }
    out
}

fn render_record(out: &mut String, record: &TraceRecord) {
    match record {
        TraceRecord::Enter {
            depth,
            elapsed_us,
            function,
            file,
            line,
            memory_bytes,
        } => {
            let _ = write!(
                out,
                "{} {}-> {function}() {file}:{line}",
                elapsed(*elapsed_us),
                indent(*depth)
            );
            if let Some(memory) = memory_bytes {
                let _ = write!(out, " [{memory}]");
            }
            out.push('\n');
        }
        TraceRecord::Exit {
            depth,
            elapsed_us,
            memory_delta,
            return_repr,
        } => {
            let _ = write!(out, "{} {}<-", elapsed(*elapsed_us), indent(*depth));
            if let Some(delta) = memory_delta {
                let _ = write!(out, " [{delta:+}]");
            }
            if let Some(repr) = return_repr {
                let _ = write!(out, " return {repr}");
            }
            out.push('\n');
        }
        TraceRecord::Statement {
            depth,
            elapsed_us,
            file,
            line,
        } => {
            let _ = writeln!(
                out,
                "{} {} @ {file}:{line}",
                elapsed(*elapsed_us),
                indent(*depth)
            );
        }
    }
}

/// Elapsed time as zero-padded seconds, fixed width for column alignment
fn elapsed(us: u64) -> String {
    format!("{:>7}.{:06}", us / 1_000_000, us % 1_000_000)
}

fn indent(depth: u32) -> String {
    "  ".repeat(depth as usize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_envelope_stamps() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(render_start(at), "TRACE START [2024-03-09 14:30:05]\n");
        assert_eq!(render_end(at), "TRACE END   [2024-03-09 14:30:05]\n");
    }

    #[test]
    fn test_enter_row_indents_by_depth() {
        let text = render_records(&[TraceRecord::Enter {
            depth: 2,
            elapsed_us: 1_500_250,
            function: "helper".to_string(),
            file: "/app/a.php".to_string(),
            line: 8,
            memory_bytes: None,
        }]);
        assert_eq!(text, "      1.500250     -> helper() /app/a.php:8\n");
    }

    #[test]
    fn test_exit_row_shows_delta_and_return() {
        let text = render_records(&[TraceRecord::Exit {
            depth: 1,
            elapsed_us: 42,
            memory_delta: Some(-128),
            return_repr: Some("true".to_string()),
        }]);
        assert_eq!(text, "      0.000042   <- [-128] return true\n");
    }

    #[test]
    fn test_statement_row() {
        let text = render_records(&[TraceRecord::Statement {
            depth: 0,
            elapsed_us: 7,
            file: "/app/a.php".to_string(),
            line: 3,
        }]);
        assert_eq!(text, "      0.000007  @ /app/a.php:3\n");
    }
}
