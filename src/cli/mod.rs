//! CLI module - command-line interface
//!
//! Contains the REPL and command parsing.

pub mod commands;
pub mod repl;

pub use commands::{handle_command, render_trace, CommandResult};
pub use repl::Repl;
