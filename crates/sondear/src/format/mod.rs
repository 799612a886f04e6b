//! Output Formats
//!
//! Rendering (and for the native coverage listing, parsing) of everything
//! the writer puts on disk:
//!
//! - [`coverage`] — the native line-oriented coverage listing
//! - [`lcov`] — LCOV export for CI integration
//! - [`trace`] — human-readable trace text
//! - [`profile`] — call-site profile listing
//! - [`gcstats`] — GC cycle table

pub mod coverage;
pub mod gcstats;
pub mod lcov;
pub mod profile;
pub mod trace;
