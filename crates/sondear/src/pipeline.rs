//! Request Pipeline
//!
//! One [`RequestContext`] per host request, exclusively owned, carrying the
//! resolved settings, the unit registry, and the active collector sequence.
//! The context is a strict state machine:
//!
//! ```text
//! Uninitialized --on_request_start--> Active --on_request_end--> Flushing --> TornDown
//! ```
//!
//! Every hook is infallible from the host's point of view: internal
//! failures are logged and degrade to no-ops, because a diagnostics layer
//! that takes down the program it observes has negative value. Hooks
//! arriving in the wrong state are ignored the same way.

use crate::collectors::{
    Collector, CoverageCollector, DebugBridge, ExitDescriptor, FrameDescriptor, GcCycle,
    GcStatsCollector, NullBridge, Profiler, StepDebugger, TraceCollector,
};
use crate::config::Settings;
use crate::filter::FilterSet;
use crate::format;
use crate::modes::Mode;
use crate::registry::UnitRegistry;
use crate::result::{SondearError, SondearResult};
use crate::unit::{UnitDescriptor, UnitId};
use crate::writer::{resolve_output_name, OutputWriter, SinkRoot, TemplateContext};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Lifecycle state of a request context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Created, not yet started
    Uninitialized,
    /// Between `on_request_start` and `on_request_end`
    Active,
    /// Inside the flush pass
    Flushing,
    /// Flushed and cleared; terminal
    TornDown,
}

/// One output produced by a flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedOutput {
    /// Resolved file or buffer name
    pub name: String,
    /// Bytes written
    pub bytes: u64,
}

/// Result of the flush pass.
///
/// A failed sink aborts that sink only; the summary carries both the
/// outputs that completed and the errors from those that did not.
#[derive(Debug, Default)]
pub struct FlushSummary {
    /// Outputs written, in flush order
    pub outputs: Vec<FlushedOutput>,
    /// Per-sink failures
    pub errors: Vec<SondearError>,
}

impl FlushSummary {
    /// True if every active sink flushed cleanly
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-request diagnostics context
#[derive(Debug)]
pub struct RequestContext {
    settings: Settings,
    filter: FilterSet,
    registry: UnitRegistry,
    collectors: Vec<Collector>,
    state: RequestState,
    depth: u32,
    script: String,
    sink: SinkRoot,
    started_at: DateTime<Utc>,
    /// Protocol layer handed over before start; consumed into the step
    /// debugger when debug mode is active
    bridge: Option<Box<dyn DebugBridge>>,
}

impl RequestContext {
    /// Create a context from resolved settings.
    ///
    /// The filter compiles here; malformed patterns are dropped with a
    /// warning (see [`FilterSet::compile`]). Output lands under the
    /// configured directory.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let sink = SinkRoot::directory(settings.output_dir.clone());
        Self::with_sink(settings, sink)
    }

    /// Create a context writing into the given sink root
    #[must_use]
    pub fn with_sink(settings: Settings, sink: SinkRoot) -> Self {
        let (filter, rejected) = FilterSet::compile(settings.filter_mode, &settings.filter_rules);
        for err in &rejected {
            tracing::warn!(error = %err, "filter pattern rejected at context creation");
        }
        Self {
            settings,
            filter,
            registry: UnitRegistry::new(),
            collectors: Vec::new(),
            state: RequestState::Uninitialized,
            depth: 0,
            script: String::new(),
            sink,
            started_at: Utc::now(),
            bridge: None,
        }
    }

    /// Attach the wire-protocol collaborator. Must happen before
    /// `on_request_start`; with debug mode active and no bridge attached,
    /// a [`NullBridge`] is used and step debugging never breaks.
    pub fn attach_debug_bridge(&mut self, bridge: Box<dyn DebugBridge>) {
        self.bridge = Some(bridge);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Resolved settings for this request
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The unit registry
    #[must_use]
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// The sink root; memory sinks expose flushed buffers here
    #[must_use]
    pub fn sink(&self) -> &SinkRoot {
        &self.sink
    }

    /// Current function nesting depth
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Begin the request: install the collector sequence and go active.
    ///
    /// Collectors install in dispatch order, coverage last (its opcode
    /// override must not be masked by a later installer). Calling this in
    /// any state but `Uninitialized` is logged and ignored.
    pub fn on_request_start(&mut self, script: &str) {
        if self.state != RequestState::Uninitialized {
            tracing::warn!(state = ?self.state, "ignoring on_request_start outside Uninitialized");
            return;
        }
        self.script = script.to_string();
        self.started_at = Utc::now();

        for mode in self.settings.mode.dispatch_order() {
            match mode {
                Mode::Debug => {
                    let bridge = self
                        .bridge
                        .take()
                        .unwrap_or_else(|| Box::new(NullBridge::default()));
                    let timeout = Duration::from_millis(self.settings.remote_timeout_ms);
                    self.collectors
                        .push(Collector::StepDebug(StepDebugger::new(bridge, timeout)));
                }
                Mode::Trace => {
                    let mut trace = TraceCollector::new(
                        self.settings.show_mem_delta,
                        self.settings.collect_return,
                    );
                    if self.settings.trace_statements {
                        trace = trace.with_statements();
                    }
                    self.collectors.push(Collector::Trace(trace));
                }
                Mode::Profile => self.collectors.push(Collector::Profile(Profiler::new())),
                Mode::GcStats => self
                    .collectors
                    .push(Collector::GcStats(GcStatsCollector::new())),
                Mode::Coverage => self.collectors.push(Collector::Coverage(
                    CoverageCollector::new(self.settings.coverage_granularity),
                )),
                // Develop changes diagnostics rendering only.
                Mode::Develop => {}
            }
        }

        self.state = RequestState::Active;
    }

    /// Register a compiled execution unit.
    ///
    /// Returns the unit's id when it is instrumented; `None` when the
    /// context is not active or the filter ruled the unit out, letting the
    /// host skip per-statement hook calls for it entirely. Idempotent per
    /// identity.
    pub fn on_compile(&mut self, descriptor: UnitDescriptor) -> Option<UnitId> {
        if self.state != RequestState::Active || self.settings.mode.is_off() {
            return None;
        }
        let id = self.registry.register(descriptor, &self.filter);
        if let Err(err) = self.registry.mark_compiled(id) {
            tracing::warn!(error = %err, "mark_compiled failed");
            return None;
        }
        if self.registry.lookup(id).ok()?.is_eligible() {
            Some(id)
        } else {
            None
        }
    }

    /// Statement-boundary hook
    pub fn on_statement(&mut self, unit: UnitId, line: u32) {
        if self.state != RequestState::Active {
            return;
        }
        for collector in &mut self.collectors {
            if let Err(err) = collector.on_statement(&mut self.registry, unit, line) {
                tracing::warn!(%unit, line, error = %err, "statement hook failed");
            }
        }
    }

    /// Function-entry hook.
    ///
    /// Depth is tracked even past `max_nesting_level`, but collectors stop
    /// seeing frames beyond it so runaway recursion in the host cannot
    /// amplify into unbounded trace/profile growth.
    pub fn on_call_enter(&mut self, unit: UnitId, frame: &FrameDescriptor) {
        if self.state != RequestState::Active {
            return;
        }
        self.depth = self.depth.saturating_add(1);
        if self.depth > self.settings.max_nesting_level {
            return;
        }
        for collector in &mut self.collectors {
            if let Err(err) = collector.on_call_enter(&self.registry, unit, frame, self.depth) {
                tracing::warn!(%unit, error = %err, "call-enter hook failed");
            }
        }
    }

    /// Function-exit hook; mirrors the entry-side depth guard
    pub fn on_call_exit(&mut self, unit: UnitId, exit: &ExitDescriptor) {
        if self.state != RequestState::Active {
            return;
        }
        if self.depth == 0 {
            // Exit without a matching enter; the host aborted a frame.
            return;
        }
        if self.depth <= self.settings.max_nesting_level {
            for collector in &mut self.collectors {
                if let Err(err) = collector.on_call_exit(&self.registry, unit, exit, self.depth) {
                    tracing::warn!(%unit, error = %err, "call-exit hook failed");
                }
            }
        }
        self.depth -= 1;
    }

    /// Branch event from the opcode-override path
    pub fn on_branch(&mut self, unit: UnitId, line: u32, target: u32) {
        if self.state != RequestState::Active {
            return;
        }
        for collector in &mut self.collectors {
            if let Collector::Coverage(coverage) = collector {
                if let Err(err) = coverage.on_branch(&mut self.registry, unit, line, target) {
                    tracing::warn!(%unit, line, target, error = %err, "branch hook failed");
                }
            }
        }
    }

    /// Completed path signature from the opcode-override path
    pub fn on_path(&mut self, unit: UnitId, signature: u64) {
        if self.state != RequestState::Active {
            return;
        }
        for collector in &mut self.collectors {
            if let Collector::Coverage(coverage) = collector {
                if let Err(err) = coverage.on_path(&mut self.registry, unit, signature) {
                    tracing::warn!(%unit, signature, error = %err, "path hook failed");
                }
            }
        }
    }

    /// Garbage-collection cycle report from the host
    pub fn on_gc_cycle(&mut self, cycle: &GcCycle) {
        if self.state != RequestState::Active {
            return;
        }
        for collector in &mut self.collectors {
            if let Err(err) = collector.on_gc_cycle(cycle) {
                tracing::warn!(error = %err, "gc hook failed");
            }
        }
    }

    /// End the request: flush every active sink, then tear down.
    ///
    /// Entered exactly once; a second call (or a call before start) yields
    /// an empty summary carrying an invariant error. A failed sink aborts
    /// that sink only and is reported in the summary; the remaining sinks
    /// still flush. After this the context is `TornDown` and every hook is
    /// a no-op.
    pub fn on_request_end(&mut self) -> FlushSummary {
        if self.state != RequestState::Active {
            tracing::warn!(state = ?self.state, "ignoring on_request_end outside Active");
            let mut summary = FlushSummary::default();
            summary
                .errors
                .push(SondearError::invariant("on_request_end outside Active"));
            return summary;
        }
        self.state = RequestState::Flushing;

        let ctx = TemplateContext::capture(&self.script);
        let mut summary = FlushSummary::default();

        if self.settings.mode.is_active(Mode::Coverage) {
            let template = self.settings.coverage_output_name.clone();
            self.flush_sink(&mut summary, &template, &ctx, Self::write_coverage);
        }
        if self.settings.mode.is_active(Mode::Trace) {
            let template = self.settings.trace_output_name.clone();
            self.flush_sink(&mut summary, &template, &ctx, Self::write_trace);
        }
        if self.settings.mode.is_active(Mode::Profile) {
            let template = self.settings.profiler_output_name.clone();
            self.flush_sink(&mut summary, &template, &ctx, Self::write_profile);
        }
        if self.settings.mode.is_active(Mode::GcStats) {
            let template = self.settings.gc_stats_output_name.clone();
            self.flush_sink(&mut summary, &template, &ctx, Self::write_gcstats);
        }

        self.registry.clear();
        self.collectors.clear();
        self.state = RequestState::TornDown;
        summary
    }

    /// Resolve one sink's name, open it, fill it, and record the outcome
    fn flush_sink(
        &mut self,
        summary: &mut FlushSummary,
        template: &str,
        ctx: &TemplateContext,
        fill: fn(&Self, &mut OutputWriter) -> SondearResult<()>,
    ) {
        let result = (|| -> SondearResult<FlushedOutput> {
            let name = resolve_output_name(template, ctx)?;
            let mut writer = OutputWriter::open(&self.sink, &name)?;
            fill(self, &mut writer)?;
            let bytes = writer.finish(&mut self.sink)?;
            Ok(FlushedOutput { name, bytes })
        })();
        match result {
            Ok(output) => summary.outputs.push(output),
            Err(err) => {
                tracing::warn!(template, error = %err, "flush aborted for one sink");
                summary.errors.push(err);
            }
        }
    }

    /// Coverage flushes incrementally, one block per unit, so an abort
    /// mid-way leaves a prefix of complete blocks plus at most one
    /// unterminated tail the parser already knows to drop.
    fn write_coverage(&self, writer: &mut OutputWriter) -> SondearResult<()> {
        writer.write_chunk(&format::coverage::render_header())?;
        for snapshot in self.registry.snapshots() {
            writer.write_chunk(&format::coverage::render_block(&snapshot))?;
        }
        Ok(())
    }

    fn write_trace(&self, writer: &mut OutputWriter) -> SondearResult<()> {
        writer.write_chunk(&format::trace::render_start(self.started_at))?;
        for collector in &self.collectors {
            if let Collector::Trace(trace) = collector {
                writer.write_chunk(&format::trace::render_records(trace.records()))?;
            }
        }
        writer.write_chunk(&format::trace::render_end(Utc::now()))?;
        Ok(())
    }

    fn write_profile(&self, writer: &mut OutputWriter) -> SondearResult<()> {
        for collector in &self.collectors {
            if let Collector::Profile(profiler) = collector {
                writer.write_chunk(&format::profile::render(&profiler.report()))?;
            }
        }
        Ok(())
    }

    fn write_gcstats(&self, writer: &mut OutputWriter) -> SondearResult<()> {
        for collector in &self.collectors {
            if let Collector::GcStats(stats) = collector {
                writer.write_chunk(&format::gcstats::render(stats))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::modes::ModeMask;
    use crate::unit::UnitIdentity;

    fn coverage_context() -> RequestContext {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::Coverage))
            .build();
        RequestContext::with_sink(settings, SinkRoot::memory())
    }

    fn descriptor(path: &str) -> UnitDescriptor {
        UnitDescriptor::new(UnitIdentity::file(path, 1, 10)).with_executable_lines(vec![1, 2, 5])
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut ctx = coverage_context();
        assert_eq!(ctx.state(), RequestState::Uninitialized);
        ctx.on_request_start("/app/index.php");
        assert_eq!(ctx.state(), RequestState::Active);
        let summary = ctx.on_request_end();
        assert!(summary.is_clean());
        assert_eq!(ctx.state(), RequestState::TornDown);
    }

    #[test]
    fn test_hooks_before_start_are_noops() {
        let mut ctx = coverage_context();
        assert!(ctx.on_compile(descriptor("/app/a.php")).is_none());
        ctx.on_statement(UnitId::new(0), 1);
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_double_end_reports_invariant_not_panic() {
        let mut ctx = coverage_context();
        ctx.on_request_start("/app/index.php");
        assert!(ctx.on_request_end().is_clean());
        let second = ctx.on_request_end();
        assert_eq!(second.errors.len(), 1);
        assert!(matches!(
            second.errors[0],
            SondearError::InvariantViolation { .. }
        ));
    }

    #[test]
    fn test_mode_off_compiles_nothing() {
        let settings = Settings::builder().mode(ModeMask::off()).build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        assert!(ctx.on_compile(descriptor("/app/a.php")).is_none());
        let summary = ctx.on_request_end();
        assert!(summary.outputs.is_empty());
    }

    #[test]
    fn test_coverage_flush_writes_one_buffer() {
        let mut ctx = coverage_context();
        ctx.on_request_start("/app/index.php");
        let id = ctx.on_compile(descriptor("/app/index.php")).unwrap();
        for line in [1, 2, 2, 5, 5, 5] {
            ctx.on_statement(id, line);
        }
        let summary = ctx.on_request_end();
        assert!(summary.is_clean());
        assert_eq!(summary.outputs.len(), 1);

        let text = String::from_utf8(
            ctx.sink().buffer(&summary.outputs[0].name).unwrap().to_vec(),
        )
        .unwrap();
        assert!(text.starts_with("sondear-coverage 1\n"));
        assert!(text.contains("line 1 1\nline 2 2\nline 5 3\n"));
        assert!(text.ends_with("end\n"));
    }

    #[test]
    fn test_filtered_unit_yields_no_id() {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::Coverage))
            .filter(
                crate::filter::FilterMode::DenyList,
                vec![crate::filter::RuleSpec::include("/vendor/.*")],
            )
            .build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        assert!(ctx.on_compile(descriptor("/vendor/lib.php")).is_none());
        assert!(ctx.on_compile(descriptor("/app/a.php")).is_some());
    }

    #[test]
    fn test_nesting_guard_caps_collector_depth() {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::Profile))
            .max_nesting_level(2)
            .build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        let id = ctx.on_compile(descriptor("/app/a.php")).unwrap();

        let frame = FrameDescriptor {
            function: "deep".to_string(),
            file: "/app/a.php".to_string(),
            line: 1,
            memory_bytes: None,
        };
        for _ in 0..5 {
            ctx.on_call_enter(id, &frame);
        }
        assert_eq!(ctx.depth(), 5);
        for _ in 0..5 {
            ctx.on_call_exit(id, &ExitDescriptor::default());
        }
        assert_eq!(ctx.depth(), 0);
        // Balanced exits past the guard must not corrupt the summary.
        let summary = ctx.on_request_end();
        assert!(summary.is_clean());
    }

    #[test]
    fn test_trace_and_coverage_flush_two_outputs() {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::Coverage).with(Mode::Trace))
            .build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        let id = ctx.on_compile(descriptor("/app/index.php")).unwrap();
        ctx.on_call_enter(
            id,
            &FrameDescriptor {
                function: "main".to_string(),
                file: "/app/index.php".to_string(),
                line: 1,
                memory_bytes: None,
            },
        );
        ctx.on_statement(id, 1);
        ctx.on_call_exit(id, &ExitDescriptor::default());

        let summary = ctx.on_request_end();
        assert!(summary.is_clean());
        assert_eq!(summary.outputs.len(), 2);

        let names = ctx.sink().buffer_names();
        assert_eq!(names.len(), 2);
        let trace_name = names.iter().find(|n| n.starts_with("trace.")).unwrap();
        let text =
            String::from_utf8(ctx.sink().buffer(trace_name).unwrap().to_vec()).unwrap();
        assert!(text.starts_with("TRACE START ["));
        assert!(text.contains("-> main() /app/index.php:1\n"));
        assert!(text.trim_end().ends_with(']'));
    }

    #[test]
    fn test_bad_template_aborts_one_sink_only() {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::Coverage).with(Mode::Profile))
            .coverage_output_name("coverage.%q")
            .build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        let summary = ctx.on_request_end();
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(summary.errors[0], SondearError::Template { .. }));
        // Profile still flushed.
        assert_eq!(summary.outputs.len(), 1);
        assert!(summary.outputs[0].name.starts_with("profile."));
    }

    #[test]
    fn test_gc_cycles_flush_to_their_own_sink() {
        let settings = Settings::builder()
            .mode(ModeMask::only(Mode::GcStats))
            .build();
        let mut ctx = RequestContext::with_sink(settings, SinkRoot::memory());
        ctx.on_request_start("/app/index.php");
        ctx.on_gc_cycle(&GcCycle {
            collected: 7,
            duration_us: 50,
            memory_before: 2_000,
            memory_after: 1_000,
        });
        let summary = ctx.on_request_end();
        assert!(summary.is_clean());
        let text = String::from_utf8(
            ctx.sink().buffer(&summary.outputs[0].name).unwrap().to_vec(),
        )
        .unwrap();
        assert!(text.contains("runs: 1  collected: 7"));
    }
}
