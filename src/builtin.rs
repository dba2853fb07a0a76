//! Built-in commands.
//!
//! Built-ins run inside the interpreter process. They never write to the
//! standard streams directly: execution produces a [`BuiltinOutput`] whose
//! text the executor later replays through the stage's descriptor plan (or
//! hands to a command substitution as the captured value). Argument parsing
//! uses [`argh`]; `-h` and `--help` short-circuit into the generated usage
//! text instead of running the command.

use anyhow::{bail, Context, Result};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::marker::PhantomData;

use crate::env::{self, Environment};

/// Captured stdout/stderr text of one built-in invocation.
#[derive(Debug, Default, Clone)]
pub struct BuiltinOutput {
    pub out: String,
    pub err: String,
}

impl BuiltinOutput {
    pub(crate) fn stdout(text: String) -> Self {
        BuiltinOutput {
            out: text,
            err: String::new(),
        }
    }

    pub(crate) fn stderr(text: String) -> Self {
        BuiltinOutput {
            out: String::new(),
            err: text,
        }
    }
}

/// A command known to the interpreter at compile time.
///
/// Implementors return their stdout text; an `Err` becomes the built-in's
/// stderr text and is never fatal to the interpreter loop.
pub(crate) trait Builtin: Sized + FromArgs {
    /// Canonical name, e.g. "mecho".
    fn name() -> &'static str;

    fn run(self, env: &mut Environment) -> Result<String>;
}

/// Creates instances of one [`Builtin`] implementation by name.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

/// Factory seam the executor dispatches through.
pub(crate) trait BuiltinFactory {
    /// Run the built-in if `name` belongs to this factory.
    fn try_run(&self, env: &mut Environment, name: &str, args: &[&str]) -> Option<BuiltinOutput>;
}

impl<T: Builtin> BuiltinFactory for Factory<T> {
    fn try_run(&self, env: &mut Environment, name: &str, args: &[&str]) -> Option<BuiltinOutput> {
        if name != T::name() {
            return None;
        }
        let args = help_mapped(args);
        Some(match T::from_args(&[name], &args) {
            Ok(cmd) => match cmd.run(env) {
                Ok(out) => BuiltinOutput::stdout(out),
                Err(e) => BuiltinOutput::stderr(format!("{}\n", e)),
            },
            Err(exit) => early_exit_output(exit),
        })
    }
}

/// The original accepts `-h` everywhere it accepts `--help`.
pub(crate) fn help_mapped<'a>(args: &[&'a str]) -> Vec<&'a str> {
    args.iter()
        .map(|a| if *a == "-h" { "--help" } else { *a })
        .collect()
}

/// Turn an [`EarlyExit`] into captured text: usage goes to stdout, parse
/// errors to stderr.
pub(crate) fn early_exit_output(exit: EarlyExit) -> BuiltinOutput {
    let mut text = exit.output;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    if exit.status.is_ok() {
        BuiltinOutput::stdout(text)
    } else {
        BuiltinOutput::stderr(text)
    }
}

/// The full set of name-dispatched built-ins. The `.` script built-in is
/// handled by the executor directly because it forks.
pub(crate) fn registry() -> Vec<Box<dyn BuiltinFactory>> {
    vec![
        Box::new(Factory::<Export>::default()),
        Box::new(Factory::<Errno>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Echo>::default()),
    ]
}

#[derive(FromArgs)]
/// store a value as an exported variable: mexport NAME or NAME=VALUE
pub(crate) struct Export {
    #[argh(positional, greedy)]
    /// assignment to export; a bare NAME exports "1"
    pub parts: Vec<String>,
}

impl Builtin for Export {
    fn name() -> &'static str {
        "mexport"
    }

    fn run(self, env: &mut Environment) -> Result<String> {
        if self.parts.is_empty() || self.parts.len() > 3 {
            bail!("Invalid number of arguments");
        }
        let (name, value) = env::assignment(&self.parts);
        env.exported.insert(name, value);
        Ok(String::new())
    }
}

#[derive(FromArgs)]
/// display the exit code of the last program or command
pub(crate) struct Errno {}

impl Builtin for Errno {
    fn name() -> &'static str {
        "merrno"
    }

    fn run(self, env: &mut Environment) -> Result<String> {
        Ok(format!("{}\n", env.last_status))
    }
}

#[derive(FromArgs)]
/// display the current path
pub(crate) struct Pwd {}

impl Builtin for Pwd {
    fn name() -> &'static str {
        "mpwd"
    }

    fn run(self, env: &mut Environment) -> Result<String> {
        Ok(format!("{}\n", env.current_dir.display()))
    }
}

#[derive(FromArgs)]
/// change the working directory to the given path
pub(crate) struct Cd {
    #[argh(positional)]
    /// directory to switch to, absolute or relative to the current one
    pub path: String,
}

impl Builtin for Cd {
    fn name() -> &'static str {
        "mcd"
    }

    fn run(self, env: &mut Environment) -> Result<String> {
        let target = env.resolve_path(&self.path);
        if !target.is_dir() {
            bail!("Path not a directory");
        }
        let canonical = fs::canonicalize(&target)
            .with_context(|| format!("mcd: can't canonicalize {}", target.display()))?;
        env.current_dir = canonical;
        Ok(String::new())
    }
}

#[derive(FromArgs)]
/// exit from the shell with an optional exit code
pub(crate) struct Exit {
    #[argh(positional)]
    /// exit code; defaults to 0
    pub code: Option<i32>,
}

impl Builtin for Exit {
    fn name() -> &'static str {
        "mexit"
    }

    fn run(self, _env: &mut Environment) -> Result<String> {
        std::process::exit(self.code.unwrap_or(0))
    }
}

#[derive(FromArgs)]
/// print the arguments separated by spaces
pub(crate) struct Echo {
    #[argh(positional, greedy)]
    /// values to print as-is
    pub args: Vec<String>,
}

impl Builtin for Echo {
    fn name() -> &'static str {
        "mecho"
    }

    fn run(self, _env: &mut Environment) -> Result<String> {
        Ok(format!("{}\n", self.args.join(" ")))
    }
}

#[derive(FromArgs)]
/// execute the given script in a child process
pub(crate) struct Source {
    #[argh(positional)]
    /// path of the script to run
    pub script: String,
}
