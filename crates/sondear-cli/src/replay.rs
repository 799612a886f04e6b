//! Replay Log Driver
//!
//! Replays a JSON-lines instrumentation log against a real
//! [`RequestContext`], producing the same output files the live engine
//! would. One JSON object per line, tagged with `event`; `compile` events
//! introduce a host-chosen `handle` that later events reference, so the
//! log never needs to know the engine's own unit ids.
//!
//! Example log:
//!
//! ```text
//! {"event":"request_start","script":"/app/index.php"}
//! {"event":"compile","handle":1,"descriptor":{"identity":{"path":"/app/index.php","start_line":1,"end_line":10,"function":null},"executable_lines":[1,2,5]}}
//! {"event":"statement","handle":1,"line":1}
//! {"event":"request_end"}
//! ```

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use sondear::{
    ExitDescriptor, FlushSummary, FrameDescriptor, GcCycle, RequestContext, Settings, SinkRoot,
    UnitDescriptor, UnitId,
};
use std::collections::HashMap;
use std::io::BufRead;

/// One replayed hook invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// Request begins
    RequestStart {
        /// Entry script path
        script: String,
    },
    /// A unit finished compiling
    Compile {
        /// Host-chosen handle later events reference
        handle: u64,
        /// Unit descriptor as the host compiler reported it
        descriptor: UnitDescriptor,
    },
    /// One executed statement
    Statement {
        /// Unit handle
        handle: u64,
        /// Line number
        line: u32,
    },
    /// Function entry
    CallEnter {
        /// Unit handle
        handle: u64,
        /// Frame descriptor
        frame: FrameDescriptor,
    },
    /// Function exit
    CallExit {
        /// Unit handle
        handle: u64,
        /// Exit descriptor
        #[serde(default)]
        exit: ExitDescriptor,
    },
    /// Taken branch
    Branch {
        /// Unit handle
        handle: u64,
        /// Source line
        line: u32,
        /// Target line
        target: u32,
    },
    /// Completed path signature
    Path {
        /// Unit handle
        handle: u64,
        /// Path signature
        signature: u64,
    },
    /// Completed GC cycle
    GcCycle {
        /// Cycle report
        cycle: GcCycle,
    },
    /// Request ends
    RequestEnd,
}

/// What a replay run produced
#[derive(Debug)]
pub struct ReplayOutcome {
    /// Events applied, including those dropped by the filter
    pub events: u64,
    /// Flush result from `on_request_end`
    pub summary: FlushSummary,
}

/// Replay a log into a context writing under `sink`.
///
/// A log missing its `request_end` is treated as an aborted request: the
/// context still flushes, best-effort, exactly as the live abort path
/// does. Events referencing a handle the filter ruled out are skipped,
/// mirroring a host that got `None` back from compile and stopped calling
/// hooks for that unit.
pub fn replay(
    settings: Settings,
    sink: SinkRoot,
    reader: impl BufRead,
) -> CliResult<(RequestContext, ReplayOutcome)> {
    let mut ctx = RequestContext::with_sink(settings, sink);
    // handle -> Some(id) instrumented, None filtered out
    let mut handles: HashMap<u64, Option<UnitId>> = HashMap::new();
    let mut events: u64 = 0;
    let mut ended = false;
    let mut summary = FlushSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(&line)
            .map_err(|err| CliError::replay(format!("line {}: {err}", index + 1)))?;
        events += 1;

        if ended {
            return Err(CliError::replay(format!(
                "line {}: event after request_end",
                index + 1
            )));
        }

        match event {
            ReplayEvent::RequestStart { script } => ctx.on_request_start(&script),
            ReplayEvent::Compile { handle, descriptor } => {
                let id = ctx.on_compile(descriptor);
                handles.insert(handle, id);
            }
            ReplayEvent::Statement { handle, line } => {
                if let Some(id) = resolve(&handles, handle, index)? {
                    ctx.on_statement(id, line);
                }
            }
            ReplayEvent::CallEnter { handle, frame } => {
                if let Some(id) = resolve(&handles, handle, index)? {
                    ctx.on_call_enter(id, &frame);
                }
            }
            ReplayEvent::CallExit { handle, exit } => {
                if let Some(id) = resolve(&handles, handle, index)? {
                    ctx.on_call_exit(id, &exit);
                }
            }
            ReplayEvent::Branch {
                handle,
                line,
                target,
            } => {
                if let Some(id) = resolve(&handles, handle, index)? {
                    ctx.on_branch(id, line, target);
                }
            }
            ReplayEvent::Path { handle, signature } => {
                if let Some(id) = resolve(&handles, handle, index)? {
                    ctx.on_path(id, signature);
                }
            }
            ReplayEvent::GcCycle { cycle } => ctx.on_gc_cycle(&cycle),
            ReplayEvent::RequestEnd => {
                summary = ctx.on_request_end();
                ended = true;
            }
        }
    }

    if !ended {
        tracing::warn!("log ended without request_end; flushing as an aborted request");
        summary = ctx.on_request_end();
    }

    Ok((ctx, ReplayOutcome { events, summary }))
}

fn resolve(
    handles: &HashMap<u64, Option<UnitId>>,
    handle: u64,
    index: usize,
) -> CliResult<Option<UnitId>> {
    handles.get(&handle).copied().ok_or_else(|| {
        CliError::replay(format!(
            "line {}: unknown unit handle {handle}",
            index + 1
        ))
    })
}
