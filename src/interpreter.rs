//! The interpreter session: state, the interactive loop and script mode.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::builtin::{self, BuiltinFactory};
use crate::env::Environment;
use crate::error::ShellError;
use crate::lexer::Token;
use crate::resource::ResourcePlan;
use crate::sys;

/// A shell-like command interpreter.
///
/// The interpreter owns its whole session — variable stores, working
/// directory, last exit status — so several instances can coexist in one
/// process without touching process-wide state.
///
/// Example
/// ```
/// use myshell::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.eval("GREETING=hello").unwrap();
/// assert_eq!(sh.env.vars.get("GREETING").map(String::as_str), Some("hello"));
/// ```
pub struct Interpreter {
    /// Session state, exposed for embedding and tests.
    pub env: Environment,
    pub(crate) builtins: Vec<Box<dyn BuiltinFactory>>,
}

impl Interpreter {
    pub(crate) fn new(builtins: Vec<Box<dyn BuiltinFactory>>) -> Self {
        let mut env = Environment::new();
        // append the working directory so freshly built tools are found;
        // with last-match resolution they shadow system binaries
        let path = env.exported.get("PATH").cloned().unwrap_or_default();
        env.exported.insert(
            "PATH".into(),
            format!("{}:{}", path, env.current_dir.display()),
        );
        Self { env, builtins }
    }

    /// Evaluate one line: expand, split into stages, launch, replay, wait.
    pub fn eval(&mut self, line: &str) -> Result<(), ShellError> {
        let token = Token::new(line);
        self.eval_line(&token, ResourcePlan::new()).map(|_| ())
    }

    /// Evaluate one line, reporting any error on the interpreter's error
    /// stream. The loop always proceeds to the next line; a failed line
    /// leaves 127 in the status register when the command was missing and
    /// 1 otherwise.
    pub fn eval_and_report(&mut self, line: &str) {
        if let Err(e) = self.eval(line) {
            let _ = sys::write_all(2, format!("{}\n", e).as_bytes());
            self.env.last_status = match e {
                ShellError::NotFound(_) => 127,
                _ => 1,
            };
        }
    }

    /// The interactive loop: read a line, evaluate, repeat until EOF or
    /// interrupt. History persists across sessions in `~/.myshell_history`.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let history = self
            .env
            .exported
            .get("HOME")
            .map(|home| Path::new(home).join(".myshell_history"));
        if let Some(path) = &history {
            let _ = rl.load_history(path);
        }

        loop {
            let prompt = format!("{} > ", self.env.current_dir.display());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    self.eval_and_report(&line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &history {
            let _ = rl.save_history(path);
        }
        Ok(())
    }

    /// Run a script file line by line. Per-line errors are reported and the
    /// run continues; a missing file is reported and nothing runs.
    pub fn run_script(&mut self, script: &Path) {
        if !script.is_file() {
            let message = format!("Could not find file: {}\n", script.display());
            let _ = sys::write_all(2, message.as_bytes());
            return;
        }
        let file = match File::open(script) {
            Ok(file) => file,
            Err(e) => {
                let message = format!("Could not open file {}: {}\n", script.display(), e);
                let _ = sys::write_all(2, message.as_bytes());
                return;
            }
        };
        for line in BufReader::new(file).lines() {
            match line {
                Ok(line) => self.eval_and_report(&line),
                Err(_) => break,
            }
        }
    }
}

impl Default for Interpreter {
    /// An interpreter with the full built-in set: `mexport`, `merrno`,
    /// `mpwd`, `mcd`, `mexit`, `mecho` (plus `.`, which the executor
    /// dispatches itself).
    fn default() -> Self {
        Self::new(builtin::registry())
    }
}
