//! A small, embeddable command interpreter.
//!
//! This crate turns a raw line of text into running OS processes connected
//! by pipes and file redirections, with variable, glob and command
//! substitution expansion and a fixed set of in-process built-in commands.
//! The pieces compose bottom-up: the [`lexer`] produces quote- and
//! escape-aware tokens, the expander rewrites them, and the pipeline
//! executor wires descriptor plans around `fork`/`execve`.
//!
//! The main entry point is [`Interpreter`], which owns one session's
//! variables, working directory and exit status. See its docs for the
//! high-level API.

mod builtin;
mod env;
mod error;
mod expand;
mod executor;
mod external;
mod glob;
mod lexer;
mod redirect;
mod resource;
mod sys;

mod interpreter;

pub use env::Environment;
pub use error::ShellError;
pub use interpreter::Interpreter;
pub use lexer::{Quote, Token};
