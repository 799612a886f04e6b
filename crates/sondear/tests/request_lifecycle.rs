//! Request Lifecycle Integration Tests
//!
//! Exercises the full hook surface of a request context the way a host
//! engine would: start, compile, statement/call hooks, end, then reads the
//! flushed output back.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use sondear::filter::{FilterMode, FilterSet, RuleSpec};
use sondear::hits::LineTable;
use sondear::pipeline::RequestContext;
use sondear::registry::UnitRegistry;
use sondear::unit::{UnitDescriptor, UnitIdentity};
use sondear::writer::SinkRoot;
use sondear::{format, Mode, ModeMask, Settings};

fn coverage_context() -> RequestContext {
    let settings = Settings::builder()
        .mode(ModeMask::only(Mode::Coverage))
        .build();
    RequestContext::with_sink(settings, SinkRoot::memory())
}

fn index_descriptor() -> UnitDescriptor {
    UnitDescriptor::new(UnitIdentity::file("/app/index.php", 1, 10))
        .with_executable_lines(vec![1, 2, 3, 5, 8])
}

#[test]
fn test_end_to_end_coverage_block() {
    let mut ctx = coverage_context();
    ctx.on_request_start("/app/index.php");
    let id = ctx.on_compile(index_descriptor()).unwrap();
    for line in [1, 2, 2, 5, 5, 5] {
        ctx.on_statement(id, line);
    }
    let summary = ctx.on_request_end();
    assert!(summary.is_clean());

    let name = &summary.outputs[0].name;
    let text = String::from_utf8(ctx.sink().buffer(name).unwrap().to_vec()).unwrap();

    assert!(text.contains("unit /app/index.php 1 10\n"));
    assert!(text.contains("line 1 1\n"));
    assert!(text.contains("line 2 2\n"));
    assert!(text.contains("line 5 3\n"));
    // Executable-but-unhit lines appear with an explicit zero.
    assert!(text.contains("line 3 0\n"));
    assert!(text.contains("line 8 0\n"));
    // Non-executable lines are absent entirely.
    assert!(!text.contains("line 4 "));

    // The flushed file parses back to the same counts.
    let parsed = format::coverage::parse(&text).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].lines, vec![(1, 1), (2, 2), (3, 0), (5, 3), (8, 0)]);
}

#[test]
fn test_reregistration_returns_same_id_and_preserves_counts() {
    let mut ctx = coverage_context();
    ctx.on_request_start("/app/index.php");
    let first = ctx.on_compile(index_descriptor()).unwrap();
    ctx.on_statement(first, 1);
    ctx.on_statement(first, 1);

    // Recursion / repeated include re-enters the same unit.
    let second = ctx.on_compile(index_descriptor()).unwrap();
    assert_eq!(first, second);

    ctx.on_statement(second, 1);
    let summary = ctx.on_request_end();
    let text = String::from_utf8(
        ctx.sink().buffer(&summary.outputs[0].name).unwrap().to_vec(),
    )
    .unwrap();
    assert!(text.contains("line 1 3\n"));
}

#[test]
fn test_output_ordering_is_deterministic() {
    let run = || {
        let mut ctx = coverage_context();
        ctx.on_request_start("/app/index.php");
        // Deliberately not in lexicographic order.
        for path in ["/app/z.php", "/app/a.php", "/app/m.php"] {
            let id = ctx
                .on_compile(
                    UnitDescriptor::new(UnitIdentity::file(path, 1, 5))
                        .with_executable_lines(vec![1]),
                )
                .unwrap();
            ctx.on_statement(id, 1);
        }
        let summary = ctx.on_request_end();
        String::from_utf8(
            ctx.sink().buffer(&summary.outputs[0].name).unwrap().to_vec(),
        )
        .unwrap()
    };

    let first = run();
    assert_eq!(first, run(), "same compile order must give identical bytes");

    // Compilation order, not path order, drives block order.
    let z = first.find("unit /app/z.php").unwrap();
    let a = first.find("unit /app/a.php").unwrap();
    let m = first.find("unit /app/m.php").unwrap();
    assert!(z < a && a < m);
}

#[test]
fn test_abort_safe_flush_skips_unpopulated_units() {
    // An abort can land between registration and the end of compilation;
    // the registry must emit valid records for completed units only.
    let mut registry = UnitRegistry::new();
    let filter = FilterSet::none();
    let done_a = registry.register(
        UnitDescriptor::new(UnitIdentity::file("/app/a.php", 1, 5)),
        &filter,
    );
    let done_b = registry.register(
        UnitDescriptor::new(UnitIdentity::file("/app/b.php", 1, 5)),
        &filter,
    );
    let _pending = registry.register(
        UnitDescriptor::new(UnitIdentity::file("/app/c.php", 1, 5)),
        &filter,
    );
    registry.mark_compiled(done_a).unwrap();
    registry.mark_compiled(done_b).unwrap();
    registry.record_line(done_a, 2).unwrap();

    let snaps: Vec<_> = registry.snapshots().collect();
    assert_eq!(snaps.len(), 2, "no record fabricated for the pending unit");
    assert_eq!(snaps[0].identity.path, "/app/a.php");
    assert_eq!(snaps[1].identity.path, "/app/b.php");
}

#[test]
fn test_env_override_well_formed_pair_applies() {
    std::env::set_var(sondear::ENV_CONFIG_VAR, "remote_port=9003");
    let mut settings = Settings::new();
    let errors = settings.apply_env_overrides();
    std::env::remove_var(sondear::ENV_CONFIG_VAR);
    assert!(errors.is_empty());
    assert_eq!(settings.remote_port, 9003);
}

#[test]
fn test_override_without_equals_is_skipped() {
    let mut settings = Settings::new();
    let errors = settings.apply_override_str("remote_port 9003 max_nesting_level=512");
    assert!(errors.is_empty());
    assert_eq!(settings.remote_port, 9000, "malformed pair leaves default");
    assert_eq!(settings.max_nesting_level, 512);
}

#[test]
fn test_lcov_export_from_flushed_snapshots() {
    let mut ctx = coverage_context();
    ctx.on_request_start("/app/index.php");
    let id = ctx.on_compile(index_descriptor()).unwrap();
    ctx.on_statement(id, 1);
    let snapshots: Vec<_> = ctx.registry().snapshots().collect();
    let lcov = format::lcov::render(&snapshots);
    assert!(lcov.contains("SF:/app/index.php\n"));
    assert!(lcov.contains("DA:1,1\n"));
    assert!(lcov.contains("LF:5\nLH:1\n"));
}

proptest! {
    #[test]
    fn prop_hit_count_matches_statement_calls(lines in prop::collection::vec(1u32..=50, 0..200)) {
        let mut ctx = coverage_context();
        ctx.on_request_start("/app/index.php");
        let id = ctx
            .on_compile(UnitDescriptor::new(UnitIdentity::file("/app/p.php", 1, 50)))
            .unwrap();
        for &line in &lines {
            ctx.on_statement(id, line);
        }
        let unit = ctx.registry().find(&UnitIdentity::file("/app/p.php", 1, 50)).unwrap();
        assert_eq!(unit, id);
        for line in 1u32..=50 {
            let expected = lines.iter().filter(|&&l| l == line).count() as u64;
            let snapshot = ctx.registry().snapshots().next().unwrap();
            let got = snapshot
                .lines
                .iter()
                .find(|(l, _)| *l == line)
                .map_or(0, |(_, c)| *c);
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn prop_counter_saturates_at_max(base in (u64::MAX - 8)..u64::MAX, extra in 1u32..16) {
        let mut table = LineTable::new();
        table.add(7, base);
        for _ in 0..extra {
            table.record(7);
        }
        let expected = base.saturating_add(u64::from(extra));
        prop_assert_eq!(table.get(7), expected);
    }

    #[test]
    fn prop_mode_flip_inverts_eligibility(paths in prop::collection::vec("/[a-z]{1,8}/[a-z]{1,8}\\.php", 1..20)) {
        let specs = vec![
            RuleSpec::exclude("/app/generated/.*"),
            RuleSpec::include("/app/.*"),
            RuleSpec::include("/lib/.*"),
        ];
        let (allow, _) = FilterSet::compile(FilterMode::AllowList, &specs);
        let (deny, _) = FilterSet::compile(FilterMode::DenyList, &specs);
        for path in &paths {
            let identity = UnitIdentity::file(path.clone(), 1, 10);
            prop_assert_eq!(allow.is_eligible(&identity), !deny.is_eligible(&identity));
        }
    }
}
