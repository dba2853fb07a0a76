use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Mutable session state threaded through every operation of the
/// interpreter.
///
/// Two variable stores are kept: `vars` holds local variables created by
/// `NAME=VALUE` assignments, and `exported` holds the variables serialized
/// into the environment of every spawned child. The working directory and
/// the last exit status live here too — the interpreter never touches
/// process-wide state for them, so embedded instances stay independent.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Local variables; visible to expansion only.
    pub vars: HashMap<String, String>,
    /// Exported variables; passed to child processes as `NAME=VALUE`.
    pub exported: HashMap<String, String>,
    /// The working directory for command execution and relative paths.
    pub current_dir: PathBuf,
    /// Exit status of the last foreground wait, already shifted right 8
    /// bits per POSIX convention.
    pub last_status: i32,
}

impl Environment {
    /// Capture the current process state: `std::env::vars()` become the
    /// exported store, the local store starts empty.
    pub fn new() -> Self {
        let mut exported = HashMap::new();
        for (k, v) in stdenv::vars() {
            exported.insert(k, v);
        }
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars: HashMap::new(),
            exported,
            current_dir,
            last_status: 0,
        }
    }

    /// Look a name up the way variable expansion does: exported first,
    /// locals as fallback. Empty values read as absent.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.exported
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                self.vars
                    .get(key)
                    .map(String::as_str)
                    .filter(|v| !v.is_empty())
            })
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.current_dir.join(p)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the token run of an assignment into `(name, value)`.
///
/// The run is `NAME`, `NAME =` or `NAME = VALUE` (the expander splits
/// `NAME=VALUE` into three tokens). A bare name assigns `"1"`, a dangling
/// `=` assigns the empty string.
pub(crate) fn assignment<S: AsRef<str>>(parts: &[S]) -> (String, String) {
    let name = parts[0].as_ref().to_string();
    let value = match parts.len() {
        1 => "1".to_string(),
        2 => String::new(),
        _ => parts[2].as_ref().to_string(),
    };
    (name, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_exported_over_local() {
        let mut env = Environment::new();
        env.vars.insert("X".into(), "local".into());
        env.exported.insert("X".into(), "exported".into());
        assert_eq!(env.lookup("X"), Some("exported"));
    }

    #[test]
    fn lookup_falls_back_to_local_and_skips_empty() {
        let mut env = Environment::new();
        env.exported.insert("X".into(), "".into());
        env.vars.insert("X".into(), "local".into());
        assert_eq!(env.lookup("X"), Some("local"));
        assert_eq!(env.lookup("MISSING_VAR_98765"), None);
    }

    #[test]
    fn new_captures_process_environment() {
        let env = Environment::new();
        assert!(env.exported.contains_key("PATH"));
        assert!(env.vars.is_empty());
    }

    #[test]
    fn assignment_arity_rules() {
        assert_eq!(assignment(&["A"]), ("A".into(), "1".into()));
        assert_eq!(assignment(&["A", "="]), ("A".into(), "".into()));
        assert_eq!(assignment(&["A", "=", "5"]), ("A".into(), "5".into()));
    }

    #[test]
    fn resolve_path_joins_relative() {
        let mut env = Environment::new();
        env.current_dir = PathBuf::from("/tmp/work");
        assert_eq!(env.resolve_path("file"), PathBuf::from("/tmp/work/file"));
        assert_eq!(env.resolve_path("/abs"), PathBuf::from("/abs"));
    }
}
