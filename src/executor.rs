//! The pipeline executor.
//!
//! One left-to-right pass over the expanded token stream splits it into
//! stages on `|` and `&`, wiring a [`ResourcePlan`] for each. External
//! stages fork immediately; built-in stages buffer their output for a
//! replay pass that runs after the whole line is assembled. The final stage
//! merges the caller-supplied sink plan, which is how command substitution
//! captures a stage's output. The pass ends by replaying at most one
//! built-in and reaping every stage flagged to wait.

use std::fs::OpenOptions;
use std::mem;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use argh::FromArgs;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::builtin::{self, BuiltinOutput, Source};
use crate::env;
use crate::error::ShellError;
use crate::external;
use crate::interpreter::Interpreter;
use crate::lexer::Token;
use crate::redirect::{self, Direction};
use crate::resource::ResourcePlan;
use crate::sys;

/// One launched sub-command of a line: the plan's surviving obligations,
/// the child (if one was forked), whether the end-of-line pass waits for
/// it, and a built-in's buffered output (if it ran in-process).
pub(crate) struct Stage {
    plan: ResourcePlan,
    pid: Option<Pid>,
    waits: bool,
    builtin: Option<BuiltinOutput>,
}

impl Stage {
    fn builtin(plan: ResourcePlan, output: BuiltinOutput, waits: bool) -> Self {
        Stage {
            plan,
            pid: None,
            waits,
            builtin: Some(output),
        }
    }

    fn forked(plan: ResourcePlan, pid: Pid, waits: bool) -> Self {
        Stage {
            plan,
            pid: Some(pid),
            waits,
            builtin: None,
        }
    }
}

impl Interpreter {
    /// Evaluate one line against a caller-supplied output sink.
    ///
    /// Returns the buffered stdout of the final stage when that stage was a
    /// built-in whose plan asked for capture instead of replay (command
    /// substitution), `None` otherwise. Whatever happens, the sink's
    /// parent-side descriptors are released before returning, so a caller
    /// reading a capture pipe always sees end of stream.
    pub(crate) fn eval_line(
        &mut self,
        line: &Token,
        mut sink: ResourcePlan,
    ) -> Result<Option<String>, ShellError> {
        let parts = match self.expand_line(line) {
            Ok(parts) => parts,
            Err(e) => {
                sink.close_parent();
                return Err(e);
            }
        };
        if parts.is_empty() {
            sink.close_parent();
            return Ok(None);
        }

        // plans release their parent-side descriptors on drop, so an error
        // anywhere below cannot leak what was already opened
        let mut stages: Vec<Stage> = Vec::new();
        self.assemble(&parts, &mut stages, sink)?;

        if stages.iter().filter(|s| s.builtin.is_some()).count() > 1 {
            return Err(ShellError::Argument(
                "Only one built-in command allowed per line".into(),
            ));
        }

        let mut captured = None;
        for stage in &mut stages {
            let Some(output) = &stage.builtin else {
                continue;
            };
            if stage.plan.replay_builtin {
                let guard = stage.plan.redirect_streams()?;
                if !output.out.is_empty() {
                    sys::write_all(1, output.out.as_bytes())?;
                }
                if !output.err.is_empty() {
                    sys::write_all(2, output.err.as_bytes())?;
                }
                drop(guard);
            } else {
                captured = Some(output.out.clone());
            }
            stage.plan.close_parent();
        }

        for stage in &stages {
            if !stage.waits {
                continue;
            }
            let Some(pid) = stage.pid else {
                continue;
            };
            if let Ok(status) = waitpid(pid, None) {
                // the raw wait status shifted right 8 bits is the exit code
                self.env.last_status = match status {
                    WaitStatus::Exited(_, code) => code,
                    _ => 0,
                };
            }
        }

        Ok(captured)
    }

    /// Split the token stream into stages, launching each as soon as its
    /// span is delimited. The sink plan is merged into the trailing stage;
    /// with no trailing command it is released here.
    fn assemble(
        &mut self,
        parts: &[Token],
        stages: &mut Vec<Stage>,
        mut sink: ResourcePlan,
    ) -> Result<(), ShellError> {
        let mut argv: Vec<Token> = Vec::new();
        let mut plan = ResourcePlan::new();

        let mut i = 0;
        while i < parts.len() {
            let part = &parts[i];
            if *part == "|" && !part.is_escaped(0) {
                if argv.is_empty() {
                    return Err(ShellError::Argument(
                        "No command supplied to pipe on left".into(),
                    ));
                }
                let (read, write) = sys::pipe()?;
                plan.set(1, write);
                plan.add_child_close(read);
                plan.add_parent_close(write);
                let done = mem::replace(&mut plan, ResourcePlan::new());
                stages.push(self.launch(&argv, done, false)?);
                argv.clear();
                plan.set(0, read);
                plan.add_parent_close(read);
                plan.add_child_close(write);
            } else if redirect::is_redirect(part) {
                if argv.is_empty() {
                    return Err(ShellError::Argument(
                        "No command supplied to redirect on left".into(),
                    ));
                }
                let decoded = redirect::parse(part, 1, 0)?;
                match decoded.target {
                    None => {
                        i += 1;
                        if i == parts.len() {
                            return Err(ShellError::Argument(
                                "No redirect target/source specified".into(),
                            ));
                        }
                        let fd = self.open_redirect(&parts[i], decoded.direction)?;
                        plan.add_parent_close(fd);
                        plan.set(decoded.fd, fd);
                        plan.add_child_close(fd);
                    }
                    Some(target) => match decoded.direction {
                        Direction::Input => plan.set(target, decoded.fd),
                        Direction::Output => plan.set(decoded.fd, target),
                    },
                }
            } else if *part == "&" && !part.is_escaped(0) {
                if argv.is_empty() {
                    return Err(ShellError::Argument(
                        "No command supplied to run in background".into(),
                    ));
                }
                let done = mem::replace(&mut plan, ResourcePlan::new());
                stages.push(self.launch(&argv, done, false)?);
                argv.clear();
            } else {
                argv.push(part.clone());
            }
            i += 1;
        }

        if argv.is_empty() {
            if !plan.is_empty() {
                return Err(ShellError::Argument("Expected a command.".into()));
            }
            // nothing merged the sink; release its parent side so a capture
            // pipe sees end of stream
            sink.close_parent();
        } else {
            sink.merge(plan);
            stages.push(self.launch(&argv, sink, true)?);
        }
        Ok(())
    }

    fn open_redirect(&self, target: &Token, direction: Direction) -> Result<RawFd, ShellError> {
        let path = self.env.resolve_path(target.text());
        let file = match direction {
            Direction::Input => OpenOptions::new().read(true).open(&path),
            Direction::Output => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o644)
                .open(&path),
        }
        .map_err(|_| ShellError::NotFound(format!("Cannot open file {}", target.text())))?;
        Ok(file.into_raw_fd())
    }

    /// Dispatch one stage: script include, local assignment, registry
    /// built-in, or external command.
    fn launch(
        &mut self,
        argv: &[Token],
        mut plan: ResourcePlan,
        waits: bool,
    ) -> Result<Stage, ShellError> {
        let name = &argv[0];

        // `.` forks to run a script, so it is dispatched here rather than
        // through the registry
        if *name == "." {
            return self.launch_script(argv, plan, waits);
        }

        if argv.len() > 1 && argv[1] == "=" && *name != "mexport" {
            let output = if argv.len() > 3 {
                BuiltinOutput::stderr("Invalid number of arguments\n".into())
            } else {
                let texts: Vec<&str> = argv.iter().map(|t| t.text()).collect();
                let (var, value) = env::assignment(&texts);
                self.env.vars.insert(var, value);
                BuiltinOutput::default()
            };
            return Ok(Stage::builtin(plan, output, waits));
        }

        let args: Vec<&str> = argv[1..].iter().map(|t| t.text()).collect();
        let builtins = &self.builtins;
        for factory in builtins {
            if let Some(output) = factory.try_run(&mut self.env, name.text(), &args) {
                return Ok(Stage::builtin(plan, output, waits));
            }
        }

        let path = external::resolve(&self.env, name)?;
        let pid = external::spawn(&path, argv, &plan, &self.env, waits)?;
        plan.close_parent();
        Ok(Stage::forked(plan, pid, waits))
    }

    fn launch_script(
        &mut self,
        argv: &[Token],
        mut plan: ResourcePlan,
        waits: bool,
    ) -> Result<Stage, ShellError> {
        let args: Vec<&str> = argv[1..].iter().map(|t| t.text()).collect();
        let args = builtin::help_mapped(&args);
        let source = match Source::from_args(&["."], &args) {
            Ok(source) => source,
            Err(exit) => {
                let output = builtin::early_exit_output(exit);
                return Ok(Stage::builtin(plan, output, waits));
            }
        };

        let script = self.env.resolve_path(&source.script);
        let pid = match unsafe { unistd::fork() }? {
            ForkResult::Parent { child } => child,
            ForkResult::Child => {
                if !waits {
                    let _ = unistd::close(0);
                    let _ = unistd::close(1);
                    let _ = unistd::close(2);
                }
                plan.apply_in_child();
                self.run_script(&script);
                unsafe { libc::_exit(1) }
            }
        };
        plan.close_parent();
        Ok(Stage::forked(plan, pid, waits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn capture(sh: &mut Interpreter, line: &str) -> String {
        sh.capture(&Token::new(line)).unwrap()
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("executor_tests_{}_{}", std::process::id(), tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn builtin_output_is_captured() {
        let mut sh = Interpreter::default();
        assert_eq!(capture(&mut sh, "mecho hello world"), "hello world\n");
    }

    #[test]
    fn assignment_then_expansion() {
        let mut sh = Interpreter::default();
        sh.eval("X=5").unwrap();
        assert_eq!(capture(&mut sh, "mecho $X"), "5\n");
    }

    #[test]
    fn missing_command_aborts_the_line() {
        let mut sh = Interpreter::default();
        let err = sh.eval("definitely-not-a-command-20394").unwrap_err();
        assert!(matches!(err, ShellError::NotFound(_)));
    }

    #[test]
    fn external_output_flows_through_the_capture_pipe() {
        let mut sh = Interpreter::default();
        assert_eq!(capture(&mut sh, "echo external"), "external\n");
    }

    #[test]
    fn builtin_pipes_into_external() {
        let _stdio = sys::stdio_test_lock();
        let mut sh = Interpreter::default();
        assert_eq!(capture(&mut sh, "mecho through a pipe | cat"), "through a pipe\n");
    }

    #[test]
    fn second_stage_ignoring_stdin_does_not_deadlock() {
        let mut sh = Interpreter::default();
        assert_eq!(capture(&mut sh, "echo a | echo b"), "b\n");
    }

    #[test]
    fn wait_status_lands_in_the_register() {
        let mut sh = Interpreter::default();
        sh.eval("sh -c 'exit 3'").unwrap();
        assert_eq!(sh.env.last_status, 3);
        assert_eq!(capture(&mut sh, "merrno"), "3\n");
    }

    #[test]
    fn output_redirect_creates_and_truncates() {
        let _stdio = sys::stdio_test_lock();
        let dir = scratch_dir("redir_out");
        let target = dir.join("out.txt");
        let mut sh = Interpreter::default();

        sh.eval(&format!("mecho first > {}", target.display())).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first\n");

        sh.eval(&format!("mecho second > {}", target.display())).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn input_redirect_feeds_the_stage() {
        let dir = scratch_dir("redir_in");
        let source = dir.join("in.txt");
        fs::write(&source, "from a file\n").unwrap();

        let mut sh = Interpreter::default();
        assert_eq!(
            capture(&mut sh, &format!("cat < {}", source.display())),
            "from a file\n"
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn descriptor_to_descriptor_redirect() {
        let mut sh = Interpreter::default();
        assert_eq!(
            capture(&mut sh, "sh -c 'echo oops >&2' 2>&1"),
            "oops\n"
        );
    }

    #[test]
    fn missing_redirect_file_is_reported() {
        let mut sh = Interpreter::default();
        let err = sh.eval("cat < /no/such/file/09876").unwrap_err();
        assert!(matches!(err, ShellError::NotFound(_)));
    }

    #[test]
    fn missing_redirect_target_is_an_argument_error() {
        let mut sh = Interpreter::default();
        let err = sh.eval("mecho x >").unwrap_err();
        assert!(matches!(err, ShellError::Argument(_)));
    }

    #[test]
    fn pipe_without_left_command_is_rejected() {
        let mut sh = Interpreter::default();
        let err = sh.eval("| cat").unwrap_err();
        assert!(matches!(err, ShellError::Argument(_)));
    }

    #[test]
    fn trailing_pipe_expects_a_command() {
        let mut sh = Interpreter::default();
        let err = sh.eval("mecho a |").unwrap_err();
        assert!(matches!(err, ShellError::Argument(_)));
    }

    #[test]
    fn two_builtins_in_one_line_are_rejected() {
        let mut sh = Interpreter::default();
        let err = sh.eval("mecho a | mecho b").unwrap_err();
        assert!(matches!(err, ShellError::Argument(_)));
    }

    #[test]
    fn escaped_pipe_is_an_ordinary_argument() {
        let mut sh = Interpreter::default();
        assert_eq!(capture(&mut sh, r"mecho a \| b"), "a | b\n");
    }

    #[test]
    fn detached_stage_is_not_waited() {
        let mut sh = Interpreter::default();
        sh.env.last_status = 0;
        sh.eval("sh -c 'exit 7' &").unwrap();
        // the detached child cannot have updated the register
        assert_eq!(sh.env.last_status, 0);
    }

    #[test]
    fn glob_with_no_match_surfaces_as_error() {
        let dir = scratch_dir("noglob");
        let mut sh = Interpreter::default();
        sh.env.current_dir = dir.clone();
        let err = sh.eval("ls *.zzz").unwrap_err();
        assert!(matches!(err, ShellError::NoMatch(_)));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn glob_expansion_feeds_argv() {
        let dir = scratch_dir("glob_argv");
        fs::write(dir.join("one.txt"), "").unwrap();
        fs::write(dir.join("two.txt"), "").unwrap();

        let mut sh = Interpreter::default();
        sh.env.current_dir = dir.clone();
        assert_eq!(capture(&mut sh, "mecho *.txt"), "one.txt two.txt\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn script_include_requires_one_argument() {
        let mut sh = Interpreter::default();
        // arity errors surface as the built-in's captured stderr, and the
        // line itself succeeds
        sh.eval(". a b").unwrap();
        sh.eval(".").unwrap();
    }
}
