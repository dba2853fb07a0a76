//! Token expansion: quoting, variables, command substitution, globs.
//!
//! Expansion is recursive and dispatches on a token's quote tag and leading
//! characters. Command substitution re-enters the pipeline executor with a
//! capture pipe as the output sink, so arbitrarily nested `$(…)` evaluates
//! through the same machinery as a top-level line.

use crate::error::ShellError;
use crate::glob;
use crate::interpreter::Interpreter;
use crate::lexer::{Quote, Token};
use crate::resource::ResourcePlan;
use crate::sys;

impl Interpreter {
    /// Expand one raw line into the final token stream the executor
    /// consumes. An unquoted, unescaped `#` discards the rest of the line.
    pub(crate) fn expand_line(&mut self, line: &Token) -> Result<Vec<Token>, ShellError> {
        let mut result = Vec::new();
        for part in line.split_command(' ') {
            if part.quote() == Quote::Plain && part.includes_entering('#') {
                let (before, _comment) = part.split_first_entering('#');
                if !before.is_empty() {
                    self.expand_token(&before, &mut result, true, true)?;
                }
                break;
            }
            self.expand_token(&part, &mut result, true, true)?;
        }
        Ok(result)
    }

    fn expand_token(
        &mut self,
        part: &Token,
        result: &mut Vec<Token>,
        variables: bool,
        globs: bool,
    ) -> Result<(), ShellError> {
        if part.quote() == Quote::Double {
            // expand the pieces without globbing, then fold back into one
            // token joined by single spaces
            let mut pieces = Vec::new();
            for piece in part.split_entering(' ') {
                self.expand_token(&piece, &mut pieces, variables, false)?;
            }
            result.push(Token::join(&pieces, ' '));
        } else if variables && part.quote() == Quote::Substitution {
            let value = self.capture(part)?;
            if !value.is_empty() {
                result.push(Token::new(&value));
            }
        } else if part.includes_entering('=') {
            // NAME=VALUE becomes the three tokens NAME, =, VALUE so the
            // executor can recognize a leading assignment
            let (name, rest) = part.split_first_entering('=');
            if !name.is_empty() {
                result.push(name);
            }
            result.push(Token::raw("="));
            let mut pieces = Vec::new();
            if !rest.is_empty() {
                self.expand_token(&rest, &mut pieces, true, true)?;
            }
            if !pieces.is_empty() {
                result.push(Token::join(&pieces, ' '));
            }
        } else if variables && part.text().starts_with('$') && !part.is_escaped(0) {
            let key: String = part.text().chars().skip(1).collect();
            let value = self.env.lookup(&key).map(str::to_string);
            if let Some(value) = value {
                // the value may contain spaces, quotes or further sigils;
                // re-tokenize it, but do not expand variables again
                let value = Token::raw(value);
                for piece in value.split_command(' ') {
                    self.expand_token(&piece, result, false, globs)?;
                }
            }
        } else if globs && glob::is_glob(part) {
            for path in glob::expand(part, &self.env.current_dir)? {
                result.push(Token::new(&path));
            }
        } else {
            result.push(part.clone());
        }
        Ok(())
    }

    /// Evaluate a command line with stdout routed into an internal pipe and
    /// return the captured text. A built-in final stage short-circuits: its
    /// buffered output is returned directly and the remap is never applied.
    pub(crate) fn capture(&mut self, line: &Token) -> Result<String, ShellError> {
        let (read, write) = sys::pipe()?;
        let mut sink = ResourcePlan::new();
        sink.replay_builtin = false;
        sink.set(1, write);
        sink.add_child_close(read);
        sink.add_parent_close(write);

        let value = match self.eval_line(line, sink) {
            Ok(Some(buffered)) => Ok(buffered),
            Ok(None) => sys::read_all(read),
            Err(e) => Err(e),
        };
        let _ = nix::unistd::close(read);
        value
    }
}
