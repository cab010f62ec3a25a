//! A small line-oriented shell.
//!
//! This crate reads one command per line, resolves shell-local variables and
//! either runs a builtin in-process or forks a child for anything else, with
//! optional output redirection (`cmd > file`) and detached execution
//! (`cmd &`). A few builtins report on the running system from the kernel's
//! process table (`pstatus`, `sysfo`) and drive a network control system call
//! (`nw`).
//!
//! The main entry point is [`Interpreter`], which executes lines against an
//! [`Io`] pair of writers. The public modules [`command`], [`env`] and
//! [`parser`] expose the types the interpreter is built from.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
mod introspect;
pub mod lexer;
mod netstat;
pub mod parser;
pub mod procfs;
#[cfg(test)]
mod testutil;

pub use builtin::{mask_name, substitute_inline};
pub use command::Io;
pub use config::ShellConfig;
pub use error::ShellError;
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{BuiltinTable, Interpreter};
pub use netstat::{ControlOp, NetControl, SyscallControl};
