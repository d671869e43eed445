//! Shell command execution with bounded lifetime
//!
//! This crate provides the process-execution primitive used by the
//! orchestrator: spawn a command under a login shell, capture stdout
//! and stderr interleaved, and terminate the process when a timeout
//! elapses.

mod error;
mod executor;

pub use error::{ExecError, Result};
pub use executor::{ExecConfig, ProcessExecutor, ShellResult, TIMEOUT_EXIT_CODE};
