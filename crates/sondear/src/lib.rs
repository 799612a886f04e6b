//! Sondear: Per-Request Runtime Diagnostics
//!
//! Sondear (Spanish: "to probe/sound out") is an embeddable diagnostics
//! layer for language runtimes: code coverage, execution tracing,
//! profiling, GC statistics and step debugging behind a single set of
//! execution hooks. A host engine creates one [`RequestContext`] per
//! request, routes its compile/statement/call hooks through it, and flushes
//! at request end; nothing is shared between requests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SONDEAR Architecture                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────────┐   ┌────────────────────┐  │
//! │  │ Host     │   │ RequestContext │   │ Collectors         │  │
//! │  │ Engine   │──►│ (state machine │──►│ coverage / trace / │  │
//! │  │ hooks    │   │  + registry)   │   │ profile / gc / dbg │  │
//! │  └──────────┘   └───────┬────────┘   └─────────┬──────────┘  │
//! │                         │ flush                │             │
//! │                 ┌───────▼────────┐   ┌─────────▼──────────┐  │
//! │                 │ OutputWriter   │◄──│ format renderers   │  │
//! │                 │ (dir / memory) │   │ coverage/lcov/...  │  │
//! │                 └────────────────┘   └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cardinal rule: every hook is infallible from the host's point of
//! view. Internal failures log and degrade to no-ops; a diagnostics layer
//! must never be less reliable than the program it observes.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod collectors;
pub mod config;
pub mod filter;
pub mod format;
pub mod hits;
pub mod modes;
pub mod pipeline;
pub mod registry;
pub mod result;
pub mod unit;
pub mod writer;

pub use collectors::{
    BreakDecision, Collector, CoverageCollector, DebugBridge, ExitDescriptor, FrameDescriptor,
    GcCycle, Granularity, NullBridge, StepDebugger, SuspendOutcome, SuspendPoint,
};
pub use config::{Settings, SettingsBuilder, ENV_CONFIG_VAR};
pub use filter::{FilterMode, FilterSet, RuleSpec};
pub use hits::UnitSnapshot;
pub use modes::{Mode, ModeMask};
pub use pipeline::{FlushSummary, FlushedOutput, RequestContext, RequestState};
pub use registry::UnitRegistry;
pub use result::{SondearError, SondearResult};
pub use unit::{UnitDescriptor, UnitId, UnitIdentity};
pub use writer::SinkRoot;
