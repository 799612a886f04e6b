//! Step-Debug Collector
//!
//! The engine side of the wire-debugging boundary. Breakpoint evaluation,
//! socket I/O and command parsing all belong to the protocol layer behind
//! the [`DebugBridge`] trait; this collector decides *when* to consult it
//! (every statement boundary while enabled) and enforces the fail-open
//! rule: a hung or broken debugger connection disables step debugging for
//! the remainder of the request, and execution resumes at full speed.
//!
//! Suspension is a synchronous blocking call from this context's
//! perspective. The bridge may use threads or async tasks internally as
//! long as the single-context illusion holds; the deadline caps how long
//! one suspension may block.

use crate::registry::UnitRegistry;
use crate::result::{SondearError, SondearResult};
use crate::unit::UnitId;
use std::time::Duration;

/// Protocol layer's answer to "should we stop here?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakDecision {
    /// Keep executing
    Continue,
    /// Suspend at this statement
    Break,
}

/// How a cooperative suspension ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendOutcome {
    /// Client said continue; keep debugging
    Resume,
    /// Client detached; debugging is over for this request
    Detach,
    /// The deadline expired with no client command
    TimedOut,
    /// The connection dropped mid-exchange
    Disconnected,
}

/// Statement boundary the engine is suspended at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendPoint {
    /// Source file of the statement
    pub file: String,
    /// Line number of the statement
    pub line: u32,
    /// Longest the bridge may block before reporting `TimedOut`
    pub deadline: Duration,
}

/// Wire-protocol collaborator boundary
///
/// Implemented by the DBGp-style protocol layer. Both methods are called
/// from the single execution context and must behave synchronously.
pub trait DebugBridge: Send + std::fmt::Debug {
    /// Evaluate breakpoints for a statement boundary
    fn check_break(&mut self, file: &str, line: u32) -> SondearResult<BreakDecision>;

    /// Block until the client resumes, detaches, disconnects, or the
    /// deadline passes
    fn suspend(&mut self, point: &SuspendPoint) -> SondearResult<SuspendOutcome>;
}

/// Collector for the debug mode
#[derive(Debug)]
pub struct StepDebugger {
    bridge: Box<dyn DebugBridge>,
    timeout: Duration,
    enabled: bool,
}

impl StepDebugger {
    /// Attach a protocol bridge with the configured suspension deadline
    #[must_use]
    pub fn new(bridge: Box<dyn DebugBridge>, timeout: Duration) -> Self {
        Self {
            bridge,
            timeout,
            enabled: true,
        }
    }

    /// True until the debugger fails open
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn disable(&mut self, reason: &str) {
        tracing::warn!(reason, "disabling step debugging for the rest of the request");
        self.enabled = false;
    }

    /// Statement-boundary hook: breakpoint check, possibly suspension.
    ///
    /// Never propagates protocol failures to the host; any bridge error or
    /// non-resume outcome other than `Resume` disables debugging.
    pub fn on_statement(
        &mut self,
        registry: &mut UnitRegistry,
        unit: UnitId,
        line: u32,
    ) -> SondearResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let file = registry.lookup(unit)?.identity().path.clone();

        let decision = match self.bridge.check_break(&file, line) {
            Ok(decision) => decision,
            Err(err) => {
                self.disable(&format!("breakpoint check failed: {err}"));
                return Ok(());
            }
        };
        if decision == BreakDecision::Continue {
            return Ok(());
        }

        let point = SuspendPoint {
            file,
            line,
            deadline: self.timeout,
        };
        match self.bridge.suspend(&point) {
            Ok(SuspendOutcome::Resume) => {}
            Ok(SuspendOutcome::Detach) => self.disable("client detached"),
            Ok(SuspendOutcome::TimedOut) => self.disable("suspension deadline expired"),
            Ok(SuspendOutcome::Disconnected) => self.disable("client disconnected"),
            Err(err) => self.disable(&format!("suspend failed: {err}")),
        }
        Ok(())
    }
}

/// Bridge that never breaks; used when debug mode is active but no
/// protocol layer attached itself
#[derive(Debug, Default)]
pub struct NullBridge;

impl DebugBridge for NullBridge {
    fn check_break(&mut self, _file: &str, _line: u32) -> SondearResult<BreakDecision> {
        Ok(BreakDecision::Continue)
    }

    fn suspend(&mut self, _point: &SuspendPoint) -> SondearResult<SuspendOutcome> {
        Err(SondearError::protocol("no debugger client attached"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::unit::{UnitDescriptor, UnitIdentity};

    #[derive(Debug)]
    struct ScriptedBridge {
        break_on: Vec<(String, u32)>,
        outcome: SuspendOutcome,
        checks: u32,
        suspensions: u32,
    }

    impl ScriptedBridge {
        fn new(break_on: Vec<(&str, u32)>, outcome: SuspendOutcome) -> Self {
            Self {
                break_on: break_on
                    .into_iter()
                    .map(|(file, line)| (file.to_string(), line))
                    .collect(),
                outcome,
                checks: 0,
                suspensions: 0,
            }
        }
    }

    impl DebugBridge for ScriptedBridge {
        fn check_break(&mut self, file: &str, line: u32) -> SondearResult<BreakDecision> {
            self.checks += 1;
            let hit = self
                .break_on
                .iter()
                .any(|(bf, bl)| bf == file && *bl == line);
            Ok(if hit {
                BreakDecision::Break
            } else {
                BreakDecision::Continue
            })
        }

        fn suspend(&mut self, _point: &SuspendPoint) -> SondearResult<SuspendOutcome> {
            self.suspensions += 1;
            Ok(self.outcome)
        }
    }

    fn setup() -> (UnitRegistry, UnitId) {
        let mut registry = UnitRegistry::new();
        let id = registry.register(
            UnitDescriptor::new(UnitIdentity::file("/app/a.php", 1, 20)),
            &FilterSet::none(),
        );
        (registry, id)
    }

    #[test]
    fn test_no_breakpoint_keeps_running() {
        let (mut registry, id) = setup();
        let bridge = ScriptedBridge::new(vec![], SuspendOutcome::Resume);
        let mut debugger = StepDebugger::new(Box::new(bridge), Duration::from_millis(200));
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(debugger.is_enabled());
    }

    #[test]
    fn test_break_then_resume_stays_enabled() {
        let (mut registry, id) = setup();
        let bridge = ScriptedBridge::new(vec![("/app/a.php", 5)], SuspendOutcome::Resume);
        let mut debugger = StepDebugger::new(Box::new(bridge), Duration::from_millis(200));
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(debugger.is_enabled());
    }

    #[test]
    fn test_timeout_fails_open() {
        let (mut registry, id) = setup();
        let bridge = ScriptedBridge::new(vec![("/app/a.php", 5)], SuspendOutcome::TimedOut);
        let mut debugger = StepDebugger::new(Box::new(bridge), Duration::from_millis(200));
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(!debugger.is_enabled(), "timeout must disable debugging");
        // Later statements no longer consult the bridge.
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(!debugger.is_enabled());
    }

    #[test]
    fn test_disconnect_fails_open() {
        let (mut registry, id) = setup();
        let bridge = ScriptedBridge::new(vec![("/app/a.php", 5)], SuspendOutcome::Disconnected);
        let mut debugger = StepDebugger::new(Box::new(bridge), Duration::from_millis(200));
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(!debugger.is_enabled());
    }

    #[test]
    fn test_protocol_error_never_reaches_host() {
        #[derive(Debug)]
        struct FailingBridge;
        impl DebugBridge for FailingBridge {
            fn check_break(&mut self, _f: &str, _l: u32) -> SondearResult<BreakDecision> {
                Err(SondearError::protocol("malformed packet"))
            }
            fn suspend(&mut self, _p: &SuspendPoint) -> SondearResult<SuspendOutcome> {
                Err(SondearError::protocol("malformed packet"))
            }
        }

        let (mut registry, id) = setup();
        let mut debugger =
            StepDebugger::new(Box::new(FailingBridge), Duration::from_millis(200));
        // Infallible from the host's perspective.
        debugger.on_statement(&mut registry, id, 5).unwrap();
        assert!(!debugger.is_enabled());
    }
}
