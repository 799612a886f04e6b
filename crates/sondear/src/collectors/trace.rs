//! Execution Tracing
//!
//! Records one structured entry per function entry/exit (and per statement
//! when the host routes statements here) with depth, elapsed time and
//! optional memory usage. Records buffer in memory and are rendered to the
//! trace sink at flush by [`format::trace`](crate::format).

use super::{ExitDescriptor, FrameDescriptor};
use crate::registry::UnitRegistry;
use crate::result::SondearResult;
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One structured trace entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Function entry
    Enter {
        /// Nesting depth after entry
        depth: u32,
        /// Microseconds since the trace started
        elapsed_us: u64,
        /// Function name
        function: String,
        /// Call-site file
        file: String,
        /// Call-site line
        line: u32,
        /// Memory usage at entry, when the host reports it
        #[serde(default)]
        memory_bytes: Option<u64>,
    },
    /// Function exit
    Exit {
        /// Nesting depth before exit
        depth: u32,
        /// Microseconds since the trace started
        elapsed_us: u64,
        /// Memory delta over the call, when `show_mem_delta` is on and
        /// the host reported usage on both sides
        #[serde(default)]
        memory_delta: Option<i64>,
        /// Rendered return value, when `collect_return` is on
        #[serde(default)]
        return_repr: Option<String>,
    },
    /// Executed statement
    Statement {
        /// Nesting depth
        depth: u32,
        /// Microseconds since the trace started
        elapsed_us: u64,
        /// Source file
        file: String,
        /// Line number
        line: u32,
    },
}

/// Collector for the trace mode
#[derive(Debug)]
pub struct TraceCollector {
    started: Instant,
    records: Vec<TraceRecord>,
    show_mem_delta: bool,
    collect_return: bool,
    /// Memory at entry, one slot per open frame, for delta computation
    entry_memory: Vec<Option<u64>>,
    /// Depth of the statement hook's current frame
    current_depth: u32,
    record_statements: bool,
}

impl TraceCollector {
    /// Create a collector; options come from settings
    #[must_use]
    pub fn new(show_mem_delta: bool, collect_return: bool) -> Self {
        Self {
            started: Instant::now(),
            records: Vec::new(),
            show_mem_delta,
            collect_return,
            entry_memory: Vec::new(),
            current_depth: 0,
            record_statements: false,
        }
    }

    /// Also emit a record per executed statement (very verbose)
    #[must_use]
    pub fn with_statements(mut self) -> Self {
        self.record_statements = true;
        self
    }

    fn elapsed_us(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Statement-boundary record, when statement tracing is on
    pub fn on_statement(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        line: u32,
    ) -> SondearResult<()> {
        if !self.record_statements {
            return Ok(());
        }
        let file = registry.lookup(unit)?.identity().path.clone();
        self.records.push(TraceRecord::Statement {
            depth: self.current_depth,
            elapsed_us: self.elapsed_us(),
            file,
            line,
        });
        Ok(())
    }

    /// Function-entry record
    pub fn on_call_enter(
        &mut self,
        _registry: &UnitRegistry,
        _unit: UnitId,
        frame: &FrameDescriptor,
        depth: u32,
    ) -> SondearResult<()> {
        self.current_depth = depth;
        self.entry_memory.push(frame.memory_bytes);
        self.records.push(TraceRecord::Enter {
            depth,
            elapsed_us: self.elapsed_us(),
            function: frame.function.clone(),
            file: frame.file.clone(),
            line: frame.line,
            memory_bytes: frame.memory_bytes,
        });
        Ok(())
    }

    /// Function-exit record
    pub fn on_call_exit(
        &mut self,
        _registry: &UnitRegistry,
        _unit: UnitId,
        exit: &ExitDescriptor,
        depth: u32,
    ) -> SondearResult<()> {
        self.current_depth = depth.saturating_sub(1);
        let at_entry = self.entry_memory.pop().flatten();
        let memory_delta = if self.show_mem_delta {
            match (at_entry, exit.memory_bytes) {
                (Some(before), Some(after)) => Some(after as i64 - before as i64),
                _ => None,
            }
        } else {
            None
        };
        let return_repr = if self.collect_return {
            exit.return_repr.clone()
        } else {
            None
        };
        self.records.push(TraceRecord::Exit {
            depth,
            elapsed_us: self.elapsed_us(),
            memory_delta,
            return_repr,
        });
        Ok(())
    }

    /// Buffered records, in execution order
    #[must_use]
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Number of buffered records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing has been traced
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
