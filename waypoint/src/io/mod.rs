//! Side-effecting helpers (filesystem, subprocesses, configuration).
//!
//! Everything here takes an explicit [`paths::WorkspacePaths`] or path argument;
//! nothing reads the current directory implicitly.

pub mod config;
pub mod loop_log;
pub mod paths;
pub mod process;
pub mod smoke;
pub mod store;
