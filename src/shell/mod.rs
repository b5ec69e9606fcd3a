//! Interactive command shell
//!
//! [`commands`] holds the command grammar and its execution against a
//! [`Session`](crate::session::Session); [`repl`] wraps it in a line editor.

pub mod commands;
pub mod repl;

pub use commands::{execute_line, split_known, split_line, AlgorithmFlags, Reply, ShellCommand};
pub use repl::Repl;
