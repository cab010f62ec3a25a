use crate::command::{
    CommandFactory, CommandInfo, ExecutableCommand, ExitCode, Io, Job, STATUS_FAILED, STATUS_OK,
};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::ExternalCommand;
use crate::lexer;
use crate::parser::{self, CommandInvocation};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::Path;
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// One entry of the builtin table: the name it answers to and the command type
/// it parses arguments into. A type may be registered under several names.
pub(crate) struct Factory<T> {
    pub(crate) name: &'static str,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: CommandInfo> Factory<T> {
    /// Register `T` under its canonical name.
    pub(crate) fn new() -> Self {
        Self::alias(T::name())
    }

    /// Register `T` under another name.
    pub(crate) fn alias(name: &'static str) -> Self {
        Self {
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Ordered set of builtins. Lookup is exact, case-sensitive, first match.
pub struct BuiltinTable {
    entries: Vec<Box<dyn CommandFactory>>,
}

impl BuiltinTable {
    pub fn new(entries: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { entries }
    }

    /// Index of the first entry called `name`.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|f| f.name() == name)
    }

    pub fn entries(&self) -> &[Box<dyn CommandFactory>] {
        &self.entries
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        use crate::builtin::*;
        use crate::introspect::{Pstatus, Sysfo};
        use crate::netstat::Nw;
        Self::new(vec![
            Box::new(Factory::<Set>::new()),
            Box::new(Factory::<Get>::new()),
            Box::new(Factory::<Ls>::new()),
            Box::new(Factory::<LsPrivate>::new()),
            Box::new(Factory::<Cd>::new()),
            Box::new(Factory::<Pwd>::new()),
            Box::new(Factory::<Cat>::new()),
            Box::new(Factory::<Help>::new()),
            Box::new(Factory::<Help>::alias("help")),
            Box::new(Factory::<Pstatus>::new()),
            Box::new(Factory::<Sysfo>::new()),
            Box::new(Factory::<Nw>::new()),
            Box::new(Factory::<Exec>::new()),
            Box::new(Factory::<Quit>::new()),
            Box::new(Factory::<Quit>::alias("exit")),
        ])
    }
}

/// A line-oriented shell that executes builtins in-process and everything
/// else as a child process.
///
/// The interpreter owns the [`Environment`] and the [`BuiltinTable`].
///
/// Example
/// ```
/// use minish::{Interpreter, Io, ShellConfig};
/// let mut sh = Interpreter::new(ShellConfig::default());
/// let (mut out, mut err) = (Vec::new(), Vec::new());
/// sh.execute_line("set greet = hello", &mut Io::new(&mut out, &mut err));
/// sh.execute_line("get greet", &mut Io::new(&mut out, &mut err));
/// assert_eq!(out, b"hello\n");
/// ```
pub struct Interpreter {
    env: Environment,
    table: BuiltinTable,
}

impl Interpreter {
    /// Create an interpreter with the default builtin table.
    pub fn new(config: ShellConfig) -> Self {
        Self::with_table(config, BuiltinTable::default())
    }

    pub fn with_table(config: ShellConfig, table: BuiltinTable) -> Self {
        Self {
            env: Environment::new(config),
            table,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn table(&self) -> &BuiltinTable {
        &self.table
    }

    /// True once `quit` or `exit` ran.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parse and run one line of input.
    ///
    /// Errors are printed to `io.stderr` and never propagate: the caller
    /// simply reads the next line. A line without words prints an empty line.
    pub fn execute_line(&mut self, line: &str, io: &mut Io<'_>) -> ExitCode {
        let result: anyhow::Result<ExitCode> = match parser::parse_line(line) {
            Ok(Some(invocation)) => self.run_invocation(invocation, io),
            Ok(None) => writeln!(io.stdout).map(|_| STATUS_OK).map_err(Into::into),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(code) => code,
            Err(e) => {
                let user_error = e
                    .downcast_ref::<ShellError>()
                    .is_some_and(ShellError::is_user_error);
                debug!(user_error, "command failed: {e:#}");
                let _ = writeln!(io.stderr, "minish: {e:#}");
                let _ = io.stderr.flush();
                STATUS_FAILED
            }
        }
    }

    /// Resolve and run an already parsed invocation.
    pub fn run_invocation(
        &mut self,
        invocation: CommandInvocation,
        io: &mut Io<'_>,
    ) -> anyhow::Result<ExitCode> {
        self.dispatch(invocation, io, 0)
    }

    fn dispatch(
        &mut self,
        mut invocation: CommandInvocation,
        io: &mut Io<'_>,
        depth: usize,
    ) -> anyhow::Result<ExitCode> {
        let Some(name) = invocation.name() else {
            return Ok(STATUS_OK);
        };

        if let Some(alias) = name.strip_prefix('$') {
            let limit = self.env.config.max_alias_depth;
            if depth >= limit {
                return Err(ShellError::AliasDepthExceeded(limit).into());
            }
            let value = self
                .env
                .vars
                .get(alias)
                .ok_or_else(|| ShellError::VariableNotFound(alias.to_string()))?;
            let argv = lexer::tokenize(value);
            debug!(alias, ?argv, "expanding alias");
            invocation.argv = argv;
            return self.dispatch(invocation, io, depth + 1);
        }

        let args: Vec<&str> = invocation.argv[1..].iter().map(String::as_str).collect();
        let command: Box<dyn ExecutableCommand> = match self.table.resolve(name) {
            Some(index) => {
                debug!(name, ?args, "builtin");
                self.table.entries[index].create(&args)
            }
            None => {
                debug!(name, ?args, "external");
                Box::new(ExternalCommand::new(invocation.argv.clone()))
            }
        };
        let job = Job {
            background: invocation.background,
            redirect: invocation.redirect.as_deref(),
        };
        command.execute(self, io, &job)
    }

    /// Read-Eval-Print Loop on the terminal.
    ///
    /// Ctrl-C drops the current line; Ctrl-D or `quit` ends the loop.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();

        while !self.env.should_exit {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    let mut out = stdout.lock();
                    let mut err = stderr.lock();
                    self.execute_line(&line, &mut Io::new(&mut out, &mut err));
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// `user@host-cwd$ `
    fn prompt(&self) -> String {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "user".to_string());
        let host = hostname(&self.env.config.proc_root);
        format!("{user}@{host}-{}$ ", self.env.current_dir.display())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

fn hostname(proc_root: &Path) -> String {
    std::fs::read_to_string(proc_root.join("sys/kernel/hostname"))
        .map(|h| h.trim().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
