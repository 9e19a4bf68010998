//! Command execution seam.
//!
//! The dispatcher never talks to AWS directly. It hands each approved
//! command to a `CommandExecutor` and gets back a `CommandOutput` or a
//! `ToolExecutionError`. The CLI provides the AWS CLI backed executor;
//! tests provide scripted ones.

pub mod executor;

pub use executor::{CommandExecutor, CommandOutput, ToolOutput, ToolOutputPart};
