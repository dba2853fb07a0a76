//! Resolution and launching of external commands.
//!
//! Resolution knows two shapes: `./`-prefixed tokens name a file relative to
//! the session's working directory, everything else is searched in the
//! exported `PATH`. The search keeps the **last** directory that yields a
//! regular file — combined with the startup `PATH` append this lets binaries
//! in the working directory shadow system ones.

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::unistd::{self, ForkResult, Pid};

use crate::env::Environment;
use crate::error::ShellError;
use crate::lexer::Token;
use crate::resource::ResourcePlan;

/// Resolve a command token to the executable path to `execve`.
pub(crate) fn resolve(env: &Environment, command: &Token) -> Result<PathBuf, ShellError> {
    if command.sub_part(0, 2) == "./" {
        let path = env.current_dir.join(command.text());
        if !path.is_file() {
            return Err(ShellError::NotFound(format!(
                "File not found: {}",
                command.text()
            )));
        }
        return Ok(fs::canonicalize(&path).unwrap_or(path));
    }

    let search = env.exported.get("PATH").map(String::as_str).unwrap_or("");
    let mut found = None;
    for dir in search.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(command.text());
        if candidate.is_file() {
            // last match wins
            found = Some(candidate);
        }
    }
    found.ok_or_else(|| ShellError::NotFound(format!("Command not found: {}", command.text())))
}

/// Fork and exec one pipeline stage.
///
/// The child applies the stage's descriptor plan, moves to the session's
/// working directory and execs with the exported variables as its whole
/// environment. A failed exec makes the child `_exit(1)`; the parent is
/// untouched. Detached children close their standard streams first, before
/// the plan can remap them.
pub(crate) fn spawn(
    path: &Path,
    argv: &[Token],
    plan: &ResourcePlan,
    env: &Environment,
    waits: bool,
) -> Result<Pid, ShellError> {
    // everything the child needs is built before the fork
    let prog = c_string(path.as_os_str().as_bytes())?;
    let args = argv
        .iter()
        .map(|t| c_string(t.text().as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    let vars = env
        .exported
        .iter()
        .map(|(k, v)| c_string(format!("{}={}", k, v).as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    let cwd = c_string(env.current_dir.as_os_str().as_bytes())?;

    match unsafe { unistd::fork() }? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => {
            if !waits {
                let _ = unistd::close(0);
                let _ = unistd::close(1);
                let _ = unistd::close(2);
            }
            plan.apply_in_child();
            let _ = unistd::chdir(cwd.as_c_str());
            let _ = unistd::execve(&prog, &args, &vars);
            unsafe { libc::_exit(1) }
        }
    }
}

fn c_string(bytes: &[u8]) -> Result<CString, ShellError> {
    CString::new(bytes).map_err(|_| ShellError::Argument("Argument contains a NUL byte".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("external_tests_{}_{}", std::process::id(), tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn path_search_keeps_the_last_match() {
        let base = scratch_dir("last");
        let first = base.join("first");
        let second = base.join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        File::create(first.join("tool")).unwrap();
        File::create(second.join("tool")).unwrap();

        let mut env = Environment::new();
        env.exported.insert(
            "PATH".into(),
            format!("{}:{}", first.display(), second.display()),
        );

        let found = resolve(&env, &Token::new("tool")).unwrap();
        assert_eq!(found, second.join("tool"));

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn missing_command_is_not_found() {
        let mut env = Environment::new();
        env.exported.insert("PATH".into(), "/does/not/exist".into());
        let err = resolve(&env, &Token::new("missing-cmd")).unwrap_err();
        assert!(matches!(err, ShellError::NotFound(_)));
    }

    #[test]
    fn dot_slash_resolves_against_session_directory() {
        let base = scratch_dir("dot");
        File::create(base.join("prog")).unwrap();

        let mut env = Environment::new();
        env.current_dir = base.clone();

        let found = resolve(&env, &Token::new("./prog")).unwrap();
        assert!(found.ends_with("prog"));

        let err = resolve(&env, &Token::new("./absent")).unwrap_err();
        assert!(matches!(err, ShellError::NotFound(_)));

        let _ = fs::remove_dir_all(base);
    }
}
