use crate::command::{
    CommandFactory, CommandInfo, ExecutableCommand, ExitCode, Io, Job, STATUS_OK, with_output,
};
use crate::env::{Environment, VariableStore};
use crate::error::ShellError;
use crate::interpreter::{Factory, Interpreter};
use crate::lexer;
use crate::parser::CommandInvocation;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They only see the
/// [`Environment`]; commands that need the whole interpreter implement
/// [`ExecutableCommand`] themselves.
pub(crate) trait BuiltinCommand: Sized + FromArgs + CommandInfo {
    /// Executes the command against its output writer and the diagnostic stream.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode> {
        let env = shell.env_mut();
        with_output(io, job, |stdout, stderr| {
            BuiltinCommand::execute(*self, stdout, stderr, env)
        })
    }
}

/// Stands in for a command whose arguments did not parse (or asked for `--help`).
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode> {
        if self.is_error {
            return Err(ShellError::Usage(self.output.trim_end().to_string()).into());
        }
        with_output(io, job, |stdout, _| {
            stdout.write_all(self.output.as_bytes())?;
            Ok(STATUS_OK)
        })
    }
}

impl<T> CommandFactory for Factory<T>
where
    T: FromArgs + CommandInfo + ExecutableCommand + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn summary(&self) -> &'static str {
        T::summary()
    }

    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand> {
        // A leading `--` ends option parsing, so argh reads everything
        // after it as positionals and ignores its help triggers.
        let parsed = if T::operands_only() {
            let mut operands = Vec::with_capacity(args.len() + 1);
            operands.push("--");
            operands.extend_from_slice(args);
            T::from_args(&[self.name], &operands)
        } else {
            T::from_args(&[self.name], args)
        };
        match parsed {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        }
    }
}

#[derive(FromArgs)]
/// Store a shell variable: `set name = value`.
pub struct Set {
    #[argh(positional)]
    /// variable name.
    pub name: String,

    #[argh(positional)]
    /// separator word, conventionally `=`.
    pub separator: String,

    #[argh(positional)]
    /// value to store.
    pub value: String,
}

impl CommandInfo for Set {
    fn name() -> &'static str {
        "set"
    }

    fn summary() -> &'static str {
        "set {var} = {value}: store a variable"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Set {
    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        debug!(name = %self.name, separator = %self.separator, "set variable");
        env.vars.set(&self.name, &self.value)?;
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// Print the value of a shell variable.
pub struct Get {
    #[argh(positional)]
    /// variable name.
    pub name: String,
}

impl CommandInfo for Get {
    fn name() -> &'static str {
        "get"
    }

    fn summary() -> &'static str {
        "get {var}: print the value of a variable"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Get {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let value = env
            .vars
            .get(&self.name)
            .ok_or_else(|| ShellError::VariableNotFound(self.name.clone()))?;
        writeln!(stdout, "{value}")?;
        Ok(STATUS_OK)
    }
}

/// Entry names of `dir` in directory-stream order; `.` and `..` never appear.
fn list_dir(env: &Environment, dir: Option<&str>) -> Result<Vec<String>> {
    let path = env.current_dir.join(dir.unwrap_or("."));
    let entries =
        fs::read_dir(&path).with_context(|| format!("cannot open directory {}", path.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot read directory {}", path.display()))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Replace the last six characters of `name` with `_`.
///
/// Names of six characters or fewer come out fully masked. Counting is by
/// character, not byte.
pub fn mask_name(name: &str) -> String {
    const MASKED: usize = 6;
    let len = name.chars().count();
    let keep = len.saturating_sub(MASKED);
    name.chars()
        .enumerate()
        .map(|(i, c)| if i < keep { c } else { '_' })
        .collect()
}

#[derive(FromArgs)]
/// List directory contents.
pub struct Ls {
    #[argh(positional)]
    /// directory to list; defaults to the current directory.
    pub dir: Option<String>,
}

impl CommandInfo for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn summary() -> &'static str {
        "list directory contents"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Ls {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for name in list_dir(env, self.dir.as_deref())? {
            writeln!(stdout, "{name}")?;
        }
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// List directory contents with the tail of every name hidden.
pub struct LsPrivate {
    #[argh(positional)]
    /// directory to list; defaults to the current directory.
    pub dir: Option<String>,
}

impl CommandInfo for LsPrivate {
    fn name() -> &'static str {
        "ls_p"
    }

    fn summary() -> &'static str {
        "list directory contents, masking the last 6 characters of each name"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for LsPrivate {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for name in list_dir(env, self.dir.as_deref())? {
            writeln!(stdout, "{}", mask_name(&name))?;
        }
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl CommandInfo for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn summary() -> &'static str {
        "print the current directory"
    }
}

impl BuiltinCommand for Pwd {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl CommandInfo for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn summary() -> &'static str {
        "cd {directory}: change the current directory"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Cd {
    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = PathBuf::from(&self.target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// Print a file to standard output.
pub struct Cat {
    #[argh(positional)]
    /// file to print.
    pub file: String,
}

impl CommandInfo for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn summary() -> &'static str {
        "cat {file}: display the contents of a file"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Cat {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let path = env.current_dir.join(&self.file);
        let file = File::open(&path).with_context(|| format!("cat: {}", self.file))?;
        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            stdout.write_all(&line)?;
        }
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Quit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl CommandInfo for Quit {
    fn name() -> &'static str {
        "quit"
    }

    fn summary() -> &'static str {
        "exit the shell"
    }

    fn operands_only() -> bool {
        true
    }
}

impl BuiltinCommand for Quit {
    fn execute(
        self,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(STATUS_OK)
    }
}

#[derive(FromArgs)]
/// List the builtin commands.
pub struct Help {}

impl CommandInfo for Help {
    fn name() -> &'static str {
        "?"
    }

    fn summary() -> &'static str {
        "display this help message"
    }
}

impl ExecutableCommand for Help {
    fn execute(
        self: Box<Self>,
        shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode> {
        with_output(io, job, |stdout, _| {
            writeln!(stdout, "Available commands:")?;
            for entry in shell.table().entries() {
                writeln!(stdout, "{} - {}", entry.name(), entry.summary())?;
            }
            writeln!(stdout, "$var - run the command stored in a variable")?;
            writeln!(stdout, "{{command}} & - run a command in the background")?;
            writeln!(stdout, "{{command}} > file - send a command's output to a file")?;
            Ok(STATUS_OK)
        })
    }
}

#[derive(FromArgs)]
/// Run a command line, expanding one `$ name` reference.
pub struct Exec {
    #[argh(positional, greedy)]
    /// words of the command; a leading `&` runs it in the background.
    pub words: Vec<String>,
}

impl CommandInfo for Exec {
    fn name() -> &'static str {
        "exec"
    }

    fn summary() -> &'static str {
        "exec [&] {command...}: run a command, `$ var` is replaced by the variable's value"
    }

    fn operands_only() -> bool {
        true
    }
}

/// Apply inline substitution to an argument list.
///
/// The first word that is exactly `$` consumes the following word as a variable
/// name, and the whole list becomes the single resolved value. Everything
/// after the name is dropped. The value is not scanned again.
pub fn substitute_inline(
    words: &[String],
    vars: &VariableStore,
) -> Result<Vec<String>, ShellError> {
    let Some(pos) = words.iter().position(|w| w == "$") else {
        return Ok(words.to_vec());
    };
    let name = words.get(pos + 1).ok_or(ShellError::MissingVariableName)?;
    let value = vars
        .get(name)
        .ok_or_else(|| ShellError::VariableNotFound(name.clone()))?;
    Ok(vec![value.to_string()])
}

impl ExecutableCommand for Exec {
    fn execute(
        self: Box<Self>,
        shell: &mut Interpreter,
        io: &mut Io<'_>,
        job: &Job<'_>,
    ) -> Result<ExitCode> {
        let mut words = self.words;
        let mut background = job.background;
        if words.first().map(String::as_str) == Some("&") {
            words.remove(0);
            background = true;
        }

        let words = substitute_inline(&words, &shell.env().vars)?;
        let tokens = lexer::tokenize(&words.join(" "));
        let mut invocation = CommandInvocation::from_tokens(tokens, background)?;
        if invocation.redirect.is_none() {
            invocation.redirect = job.redirect.map(str::to_string);
        }
        debug!(argv = ?invocation.argv, "exec");
        shell.run_invocation(invocation, io)
    }
}
