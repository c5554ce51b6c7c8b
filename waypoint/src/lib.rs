//! Deterministic control plane for a checkpoint-driven coding-agent workflow.
//!
//! Waypoint reads a handful of Markdown documents under `.waypoint/` (State,
//! Plan, Feedback, Context) and decides which prompt role runs next. The
//! architecture keeps a strict separation:
//!
//! - **[`doc`]**: Typed document model. Parsing never fails; it returns a
//!   partial model plus diagnostics.
//! - **[`core`]**: Pure, deterministic logic (dependency graph, invariants,
//!   trigger escalation, routing, loop transitions). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, config, subprocesses).
//!
//! Orchestration modules ([`status`], [`next`], [`validate`], [`dag`],
//! [`record`], [`feedback`]) wire core logic to I/O for each CLI command.

pub mod core;
pub mod dag;
pub mod doc;
pub mod exit_codes;
pub mod feedback;
pub mod io;
pub mod logging;
pub mod next;
pub mod record;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
