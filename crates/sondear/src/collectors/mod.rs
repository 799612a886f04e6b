//! Subsystem Collectors
//!
//! The closed set of subsystems a request can activate: coverage, tracing,
//! profiling, GC statistics, and step debugging. Each is a tagged variant
//! behind one hook surface; the pipeline holds the active sequence and
//! invokes it uniformly.
//!
//! Ordering is load-bearing: coverage fully overrides opcode handling, so
//! its variant is always last in the sequence (see
//! [`ModeMask::dispatch_order`](crate::modes::ModeMask::dispatch_order)).
//! The develop mode changes diagnostics rendering only and contributes no
//! collector.

mod coverage;
mod debugger;
mod gcstats;
mod profiler;
mod trace;

pub use coverage::{CoverageCollector, Granularity};
pub use debugger::{
    BreakDecision, DebugBridge, NullBridge, StepDebugger, SuspendOutcome, SuspendPoint,
};
pub use gcstats::{GcCycle, GcStatsCollector, GcStatsSummary};
pub use profiler::{CallSite, CallStats, Profiler, ProfileReport};
pub use trace::{TraceCollector, TraceRecord};

use crate::registry::UnitRegistry;
use crate::result::SondearResult;
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};

/// Host-supplied description of a function entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Name of the function being entered
    pub function: String,
    /// File containing the call site
    pub file: String,
    /// Line of the call site
    pub line: u32,
    /// Host memory usage at entry, in bytes, if reported
    #[serde(default)]
    pub memory_bytes: Option<u64>,
}

/// Host-supplied description of a function exit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitDescriptor {
    /// Host memory usage at exit, in bytes, if reported
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    /// Rendered return value, if `collect_return` is configured and the
    /// host supplied one
    #[serde(default)]
    pub return_repr: Option<String>,
}

/// One active subsystem
///
/// A closed enum rather than trait objects: the set is fixed, dispatch is a
/// match, and the variant order inside the pipeline's sequence carries the
/// override guarantee.
#[derive(Debug)]
pub enum Collector {
    /// Step debugging (cooperative suspension)
    StepDebug(StepDebugger),
    /// Execution tracing
    Trace(TraceCollector),
    /// Statistical profiling
    Profile(Profiler),
    /// Garbage-collector statistics
    GcStats(GcStatsCollector),
    /// Code coverage; always last in the active sequence
    Coverage(CoverageCollector),
}

impl Collector {
    /// Statement-boundary hook
    pub fn on_statement(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        line: u32,
    ) -> SondearResult<()> {
        match self {
            Collector::StepDebug(debugger) => debugger.on_statement(registry, unit, line),
            Collector::Trace(trace) => trace.on_statement(registry, unit, line),
            Collector::Coverage(coverage) => coverage.on_statement(registry, unit, line),
            Collector::Profile(_) | Collector::GcStats(_) => Ok(()),
        }
    }

    /// Function-entry hook; `depth` is the nesting level after entry
    pub fn on_call_enter(
        &mut self,
        registry: &UnitRegistry,
        unit: UnitId,
        frame: &FrameDescriptor,
        depth: u32,
    ) -> SondearResult<()> {
        match self {
            Collector::Trace(trace) => trace.on_call_enter(registry, unit, frame, depth),
            Collector::Profile(profiler) => profiler.on_call_enter(frame),
            Collector::StepDebug(_) | Collector::GcStats(_) | Collector::Coverage(_) => Ok(()),
        }
    }

    /// Function-exit hook; `depth` is the nesting level before exit
    pub fn on_call_exit(
        &mut self,
        registry: &UnitRegistry,
        unit: UnitId,
        exit: &ExitDescriptor,
        depth: u32,
    ) -> SondearResult<()> {
        match self {
            Collector::Trace(trace) => trace.on_call_exit(registry, unit, exit, depth),
            Collector::Profile(profiler) => profiler.on_call_exit(exit),
            Collector::StepDebug(_) | Collector::GcStats(_) | Collector::Coverage(_) => Ok(()),
        }
    }

    /// Garbage-collection cycle report
    pub fn on_gc_cycle(&mut self, cycle: &GcCycle) -> SondearResult<()> {
        match self {
            Collector::GcStats(stats) => {
                stats.record(cycle.clone());
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
