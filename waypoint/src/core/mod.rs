//! Deterministic, pure logic shared by the dispatcher.
//!
//! Core modules must be free of I/O side effects. They operate on parsed
//! documents and return deterministic outputs suitable for tests.

pub mod graph;
pub mod ids;
pub mod invariants;
pub mod loop_result;
pub mod router;
pub mod transition;
pub mod triggers;
pub mod types;
pub mod workflow;
