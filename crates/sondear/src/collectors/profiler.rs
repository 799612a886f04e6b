//! Statistical Profiler
//!
//! Accumulates wall time per call-site into its own hit table, a parallel
//! structure to the coverage tables but keyed by call-site identity rather
//! than line. Inclusive time comes straight off the frame stack; exclusive
//! time subtracts the time attributed to callees.

use super::{ExitDescriptor, FrameDescriptor};
use crate::result::SondearResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Identity of one call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Function name
    pub function: String,
    /// File containing the call site
    pub file: String,
    /// Line of the call site
    pub line: u32,
}

impl CallSite {
    fn from_frame(frame: &FrameDescriptor) -> Self {
        Self {
            function: frame.function.clone(),
            file: frame.file.clone(),
            line: frame.line,
        }
    }
}

/// Accumulated statistics for one call site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    /// Number of completed calls
    pub calls: u64,
    /// Inclusive wall time, nanoseconds, saturating
    pub inclusive_ns: u64,
    /// Exclusive wall time (inclusive minus callees), nanoseconds
    pub exclusive_ns: u64,
}

#[derive(Debug)]
struct OpenFrame {
    site: CallSite,
    entered: Instant,
    /// Wall time attributed to completed callees of this frame
    child_ns: u64,
}

/// Collector for the profile mode
#[derive(Debug, Default)]
pub struct Profiler {
    stack: Vec<OpenFrame>,
    table: HashMap<CallSite, CallStats>,
}

impl Profiler {
    /// Create an empty profiler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a frame for the entered call
    pub fn on_call_enter(&mut self, frame: &FrameDescriptor) -> SondearResult<()> {
        self.stack.push(OpenFrame {
            site: CallSite::from_frame(frame),
            entered: Instant::now(),
            child_ns: 0,
        });
        Ok(())
    }

    /// Close the innermost frame and accumulate its wall time.
    ///
    /// An exit without a matching enter is tolerated as a no-op: the host
    /// may abort a context between hooks and the profiler must not make
    /// that worse.
    pub fn on_call_exit(&mut self, _exit: &ExitDescriptor) -> SondearResult<()> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        let inclusive_ns =
            u64::try_from(frame.entered.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let exclusive_ns = inclusive_ns.saturating_sub(frame.child_ns);

        let stats = self.table.entry(frame.site).or_default();
        stats.calls = stats.calls.saturating_add(1);
        stats.inclusive_ns = stats.inclusive_ns.saturating_add(inclusive_ns);
        stats.exclusive_ns = stats.exclusive_ns.saturating_add(exclusive_ns);

        if let Some(parent) = self.stack.last_mut() {
            parent.child_ns = parent.child_ns.saturating_add(inclusive_ns);
        }
        Ok(())
    }

    /// Current frame-stack depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Statistics for one call site, if it completed at least once
    #[must_use]
    pub fn stats(&self, site: &CallSite) -> Option<CallStats> {
        self.table.get(site).copied()
    }

    /// Build a report: call sites ordered by inclusive time, descending,
    /// with call-site identity as the tiebreaker for determinism
    #[must_use]
    pub fn report(&self) -> ProfileReport {
        let mut entries: Vec<(CallSite, CallStats)> = self
            .table
            .iter()
            .map(|(site, stats)| (site.clone(), *stats))
            .collect();
        entries.sort_by(|a, b| {
            b.1.inclusive_ns
                .cmp(&a.1.inclusive_ns)
                .then_with(|| a.0.file.cmp(&b.0.file))
                .then_with(|| a.0.line.cmp(&b.0.line))
                .then_with(|| a.0.function.cmp(&b.0.function))
        });
        ProfileReport { entries }
    }
}

/// Ordered profiling results for the writer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileReport {
    /// `(call site, stats)` ordered by inclusive time, descending
    pub entries: Vec<(CallSite, CallStats)>,
}

impl ProfileReport {
    /// True if no call completed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn frame(function: &str, line: u32) -> FrameDescriptor {
        FrameDescriptor {
            function: function.to_string(),
            file: "/app/a.php".to_string(),
            line,
            memory_bytes: None,
        }
    }

    #[test]
    fn test_enter_exit_accumulates_calls() {
        let mut profiler = Profiler::new();
        for _ in 0..3 {
            profiler.on_call_enter(&frame("work", 5)).unwrap();
            profiler.on_call_exit(&ExitDescriptor::default()).unwrap();
        }
        let site = CallSite {
            function: "work".to_string(),
            file: "/app/a.php".to_string(),
            line: 5,
        };
        let stats = profiler.stats(&site).unwrap();
        assert_eq!(stats.calls, 3);
        assert!(stats.inclusive_ns >= stats.exclusive_ns);
    }

    #[test]
    fn test_nested_calls_attribute_child_time() {
        let mut profiler = Profiler::new();
        profiler.on_call_enter(&frame("outer", 1)).unwrap();
        profiler.on_call_enter(&frame("inner", 2)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        profiler.on_call_exit(&ExitDescriptor::default()).unwrap();
        profiler.on_call_exit(&ExitDescriptor::default()).unwrap();

        let outer = profiler
            .stats(&CallSite {
                function: "outer".to_string(),
                file: "/app/a.php".to_string(),
                line: 1,
            })
            .unwrap();
        let inner = profiler
            .stats(&CallSite {
                function: "inner".to_string(),
                file: "/app/a.php".to_string(),
                line: 2,
            })
            .unwrap();
        assert!(outer.inclusive_ns >= inner.inclusive_ns);
        assert!(outer.exclusive_ns <= outer.inclusive_ns - inner.inclusive_ns + 1_000_000);
    }

    #[test]
    fn test_unmatched_exit_is_tolerated() {
        let mut profiler = Profiler::new();
        profiler.on_call_exit(&ExitDescriptor::default()).unwrap();
        assert_eq!(profiler.depth(), 0);
        assert!(profiler.report().is_empty());
    }

    #[test]
    fn test_report_ordering_is_deterministic() {
        let mut profiler = Profiler::new();
        for line in [7, 3, 5] {
            profiler.on_call_enter(&frame("f", line)).unwrap();
            profiler.on_call_exit(&ExitDescriptor::default()).unwrap();
        }
        let report = profiler.report();
        assert_eq!(report.entries.len(), 3);
        for pair in report.entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.1.inclusive_ns > b.1.inclusive_ns
                    || (a.1.inclusive_ns == b.1.inclusive_ns && a.0.line < b.0.line),
                "report order must be inclusive-time desc with stable tiebreak"
            );
        }
    }
}
