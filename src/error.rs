use std::fmt;
use std::io;

/// Errors surfaced by the interpreter.
///
/// Every variant carries a ready-to-print message; the evaluation loop prints
/// one line per error and keeps going.
#[derive(Debug)]
pub enum ShellError {
    /// Malformed syntax: an unclosed glob class, a bad redirect token.
    Parse(String),
    /// Structurally valid input used wrongly: a pipe with no command on the
    /// left, more than one built-in in a line, bad built-in arity.
    Argument(String),
    /// A command or file that does not exist.
    NotFound(String),
    /// A recognized construct the interpreter refuses: a glob metacharacter
    /// in the directory part of a pattern.
    Unsupported(String),
    /// A glob pattern that matched no files.
    NoMatch(String),
    /// A failed system call (pipe, fork, dup, open).
    Os(io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Parse(msg) => write!(f, "{}", msg),
            ShellError::Argument(msg) => write!(f, "{}", msg),
            ShellError::NotFound(msg) => write!(f, "{}", msg),
            ShellError::Unsupported(msg) => write!(f, "{}", msg),
            ShellError::NoMatch(msg) => write!(f, "{}", msg),
            ShellError::Os(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::Os(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ShellError {
    fn from(e: io::Error) -> Self {
        ShellError::Os(e)
    }
}

impl From<nix::Error> for ShellError {
    fn from(e: nix::Error) -> Self {
        ShellError::Os(io::Error::from_raw_os_error(e as i32))
    }
}
