use crate::command::{ExecutableCommand, ExitCode, Io, Job, STATUS_OK};
use crate::error::ShellError;
use crate::interpreter::Interpreter;
use anyhow::Result;
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::signal::Signal;
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execv, fork};
use std::borrow::Cow;
use std::ffi::{CString, OsStr};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::BorrowedFd;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Command that is not a builtin.
pub struct ExternalCommand {
    argv: Vec<String>,
}

impl ExternalCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        _shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode> {
        match launch(&self.argv, job.redirect, job.background, &mut *io.stdout)? {
            Launch::Foreground(outcome) => {
                debug!(command = %self.argv[0], ?outcome, "foreground process finished");
            }
            Launch::Background(pid) => {
                debug!(command = %self.argv[0], pid = pid.as_raw(), "left running");
            }
        }
        // The child's exit status is not surfaced.
        Ok(STATUS_OK)
    }
}

/// How a foreground child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Normal exit with a status code.
    Exited(i32),
    /// Killed by a signal.
    Signaled(Signal),
    /// `waitpid` failed; the child can no longer be observed.
    Lost,
}

/// Result of [`launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Foreground(WaitOutcome),
    Background(Pid),
}

/// Fork a child that runs `argv[0]` with `argv` as its argument list.
///
/// `argv[0]` is resolved through `PATH` first; an unknown program is reported
/// without forking. When `redirect` is given, only the child opens that file
/// (create or truncate, mode 0644) and moves it onto its stdout.
///
/// Foreground launches block until the child exits or dies from a signal; a
/// stopped child keeps the shell waiting. Background launches print the
/// child's pid to `stdout` and return at once. Nothing tracks or reaps
/// background children afterwards.
pub fn launch(
    argv: &[String],
    redirect: Option<&str>,
    background: bool,
    stdout: &mut dyn Write,
) -> Result<Launch, ShellError> {
    let name = argv
        .first()
        .ok_or_else(|| ShellError::Usage("empty command".to_string()))?;
    let search_paths = std::env::var_os("PATH").unwrap_or_default();
    let program = find_command_path(&search_paths, Path::new(name))
        .ok_or_else(|| ShellError::CommandNotFound(name.clone()))?;
    let image = ChildImage::new(&program, argv, redirect)?;

    // Anything still buffered would otherwise show up after the child's output.
    stdout.flush()?;

    // SAFETY: the child only performs async-signal-safe calls (open, dup2,
    // close, execv, write, _exit) on data prepared before the fork.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => image.exec(),
        Ok(ForkResult::Parent { child }) => {
            if background {
                info!(command = %name, pid = child.as_raw(), "started background process");
                writeln!(stdout, "Process running in the background with PID {child}")?;
                stdout.flush()?;
                Ok(Launch::Background(child))
            } else {
                Ok(Launch::Foreground(wait_for_child(child)))
            }
        }
        Err(source) => Err(ShellError::Spawn {
            command: name.clone(),
            source,
        }),
    }
}

/// Everything the child needs, converted to C strings before forking.
struct ChildImage {
    program: CString,
    argv: Vec<CString>,
    redirect: Option<CString>,
}

impl ChildImage {
    fn new(program: &Path, argv: &[String], redirect: Option<&str>) -> Result<Self, ShellError> {
        let nul = |what: &str| ShellError::Usage(format!("{what} contains a NUL byte"));
        let program =
            CString::new(program.as_os_str().as_bytes()).map_err(|_| nul("program path"))?;
        let argv = argv
            .iter()
            .map(|a| CString::new(a.as_bytes()).map_err(|_| nul("argument")))
            .collect::<Result<Vec<_>, _>>()?;
        let redirect = redirect
            .map(|r| CString::new(r.as_bytes()).map_err(|_| nul("redirect target")))
            .transpose()?;
        Ok(Self {
            program,
            argv,
            redirect,
        })
    }

    /// Runs in the child only. Never returns.
    fn exec(&self) -> ! {
        if let Some(target) = &self.redirect {
            let fd = match open(
                target.as_c_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                Mode::from_bits_truncate(0o644),
            ) {
                Ok(fd) => fd,
                Err(e) => child_fail(b"minish: cannot open redirect target: ", e),
            };
            if let Err(e) = dup2(fd, libc::STDOUT_FILENO) {
                child_fail(b"minish: cannot redirect stdout: ", e);
            }
            if fd != libc::STDOUT_FILENO {
                let _ = close(fd);
            }
        }
        let err = match execv(&self.program, &self.argv) {
            Err(e) => e,
            Ok(never) => match never {},
        };
        child_fail(b"minish: exec failed: ", err)
    }
}

/// Report on fd 2 and terminate the child without running any destructors.
fn child_fail(prefix: &[u8], err: Errno) -> ! {
    // SAFETY: fd 2 stays open for the lifetime of the child.
    let stderr = unsafe { BorrowedFd::borrow_raw(libc::STDERR_FILENO) };
    let _ = nix::unistd::write(stderr, prefix);
    let _ = nix::unistd::write(stderr, err.desc().as_bytes());
    let _ = nix::unistd::write(stderr, b"\n");
    // SAFETY: _exit is async-signal-safe and skips the parent's atexit
    // handlers and stdio buffers that the forked child shares.
    unsafe { libc::_exit(1) }
}

/// Wait until `pid` exits or is killed, ignoring stop/continue transitions.
fn wait_for_child(pid: Pid) -> WaitOutcome {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(_, code)) => return WaitOutcome::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return WaitOutcome::Signaled(sig),
            Ok(WaitStatus::Stopped(_, sig)) => {
                debug!(pid = pid.as_raw(), ?sig, "child stopped; still waiting");
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => {
                warn!(pid = pid.as_raw(), "waitpid failed: {e}");
                return WaitOutcome::Lost;
            }
        }
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh`): same check, relative to the cwd.
/// - `./foo`: checked in the current directory.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    let meta = path.metadata().ok()?;
    if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
        Some(path)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::lock_current_dir;
    use std::ffi::OsStr;
    use std::fs;
    use std::fs::File;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn touch_executable(path: &Path) {
        File::create(path).expect("touch");
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/bin"), path);
        assert!(res.is_some(), "Expected to find /bin/sh via absolute path");
        let found = res.unwrap();
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), path);
        assert!(res.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let path = Path::new("sh");
        let res = find_command_path(osstr("/bin"), path);
        let found = res.expect("Expected to find 'sh' in /bin via PATH search");
        assert!(found.as_ref().ends_with("sh"));
        assert!(found.as_ref().starts_with("/bin"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("plain")).unwrap();
        let res = find_command_path(dir.path().as_os_str(), Path::new("plain"));
        assert!(res.is_none());

        touch_executable(&dir.path().join("runnable"));
        let res = find_command_path(dir.path().as_os_str(), Path::new("runnable"));
        assert!(res.is_some());
    }

    #[test]
    fn multiple_components_relative_existing() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("bin")).expect("create temp bin dir");
        touch_executable(&tmp.path().join("bin").join("sh"));

        std::env::set_current_dir(tmp.path()).expect("set cwd");
        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"));
        std::env::set_current_dir(&cwd_before).ok();

        let found = res.expect("Expected to find relative 'bin/sh' in current dir");
        assert!(found.as_ref().ends_with("bin/sh"));
    }

    #[test]
    fn current_dir_with_dot_prefix() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp = tempfile::tempdir().unwrap();
        touch_executable(&tmp.path().join("foo"));

        std::env::set_current_dir(tmp.path()).expect("set cwd");
        let res = find_command_path(osstr("/bin"), Path::new("./foo"));
        std::env::set_current_dir(&cwd_before).ok();

        let found = res.expect("Expected to find './foo' in current dir");
        assert_eq!(found.as_ref(), Path::new("./foo"));
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn foreground_launch_waits_for_exit() {
        let mut out = Vec::new();
        let res = launch(&argv(&["sh", "-c", "exit 3"]), None, false, &mut out).unwrap();
        assert_eq!(res, Launch::Foreground(WaitOutcome::Exited(3)));
        assert!(out.is_empty());
    }

    /// State letter from `/proc/<pid>/stat`, e.g. `T` for a stopped process.
    fn proc_state(pid: i32) -> Option<char> {
        let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }

    #[test]
    fn stopped_child_keeps_the_wait_going() {
        use nix::sys::signal::kill;
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; kill -STOP $$; exit 7", pid_file.display());

        let resumer = std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                let pid = fs::read_to_string(&pid_file)
                    .ok()
                    .and_then(|text| text.trim().parse::<i32>().ok());
                if let Some(pid) = pid.filter(|&pid| proc_state(pid) == Some('T')) {
                    std::thread::sleep(Duration::from_millis(500));
                    kill(Pid::from_raw(pid), Signal::SIGCONT).unwrap();
                    return true;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            false
        });

        let started = Instant::now();
        let mut out = Vec::new();
        let res = launch(&argv(&["sh", "-c", &script]), None, false, &mut out).unwrap();

        assert!(resumer.join().unwrap(), "child never reached the stopped state");
        assert_eq!(res, Launch::Foreground(WaitOutcome::Exited(7)));
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(out.is_empty());
    }

    #[test]
    fn redirect_sends_child_stdout_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        fs::write(&target, "old contents that must disappear\n").unwrap();
        let target_str = target.to_string_lossy().to_string();

        let mut out = Vec::new();
        let res = launch(
            &argv(&["sh", "-c", "echo redirected"]),
            Some(&target_str),
            false,
            &mut out,
        )
        .unwrap();

        assert_eq!(res, Launch::Foreground(WaitOutcome::Exited(0)));
        assert!(out.is_empty());
        assert_eq!(fs::read_to_string(&target).unwrap(), "redirected\n");
    }

    #[test]
    fn background_launch_returns_immediately_with_pid() {
        let started = std::time::Instant::now();
        let mut out = Vec::new();
        let res = launch(&argv(&["sleep", "2"]), None, true, &mut out).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let Launch::Background(pid) = res else {
            panic!("expected a background launch, got {res:?}");
        };
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            format!("Process running in the background with PID {pid}\n")
        );
    }

    #[test]
    fn unknown_program_is_reported_without_forking() {
        let mut out = Vec::new();
        let err = launch(&argv(&["definitely-not-a-real-program-xyz"]), None, false, &mut out)
            .unwrap_err();
        assert!(matches!(err, ShellError::CommandNotFound(name) if name == "definitely-not-a-real-program-xyz"));
    }
}
