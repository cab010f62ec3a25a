use crate::interpreter::Interpreter;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// The read-eval loop never acts on it; it exists so handlers can say what
/// happened in logs and tests.
pub type ExitCode = i32;

/// The generic "carry on" status every external launch reports.
pub const STATUS_OK: ExitCode = 0;

/// Status for a command that reported an error.
pub const STATUS_FAILED: ExitCode = 1;

/// Output and diagnostic streams of one execution.
pub struct Io<'a> {
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

impl<'a> Io<'a> {
    pub fn new(stdout: &'a mut dyn Write, stderr: &'a mut dyn Write) -> Self {
        Self { stdout, stderr }
    }
}

/// How the current invocation asked to be run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Job<'a> {
    /// Detach instead of waiting (only meaningful for spawned programs).
    pub background: bool,
    /// File that should receive standard output.
    pub redirect: Option<&'a str>,
}

/// Object-safe trait for anything the dispatcher can run.
///
/// Implemented by builtins via a blanket impl and directly by the few
/// commands that need the whole interpreter (`exec`, `?`) and by
/// external programs.
pub trait ExecutableCommand {
    fn execute(
        self: Box<Self>,
        shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode>;
}

/// Name and help line of a command type.
pub trait CommandInfo {
    /// Canonical name, e.g. "ls" or "pstatus".
    fn name() -> &'static str;

    /// One-line description shown by the help command.
    fn summary() -> &'static str;

    /// Whether every argument is an operand, including words such as `-l`,
    /// `--` or `help`. Such commands have no options and no `--help`.
    fn operands_only() -> bool {
        false
    }
}

/// One entry of the builtin table.
///
/// `create` never fails: argument errors are turned into a command that
/// reports them when executed.
pub trait CommandFactory {
    fn name(&self) -> &'static str;

    fn summary(&self) -> &'static str;

    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand>;
}

/// Run `f` against the invocation's output: the redirect target when there is
/// one (created or truncated), the shell's stdout otherwise.
///
/// The shell's own stdout is never re-pointed; a redirect only swaps which
/// writer `f` receives.
pub fn with_output<F>(io: &mut Io<'_>, job: &Job<'_>, f: F) -> Result<ExitCode>
where
    F: FnOnce(&mut dyn Write, &mut dyn Write) -> Result<ExitCode>,
{
    match job.redirect {
        Some(path) => {
            let mut file =
                File::create(path).with_context(|| format!("cannot open {path} for writing"))?;
            let code = f(&mut file, &mut *io.stderr)?;
            file.flush()?;
            Ok(code)
        }
        None => {
            let code = f(&mut *io.stdout, &mut *io.stderr)?;
            io.stdout.flush()?;
            Ok(code)
        }
    }
}
