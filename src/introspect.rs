//! Builtins that report on the running system by reading the process table.

use crate::builtin::BuiltinCommand;
use crate::command::{CommandInfo, ExitCode, STATUS_OK};
use crate::env::Environment;
use crate::error::ShellError;
use crate::procfs::{ProcTable, ProcessRecord};
use anyhow::Result;
use argh::FromArgs;
use std::io::Write;
use tracing::debug;

#[derive(FromArgs)]
/// List processes; exactly one view flag is required.
pub struct Pstatus {
    #[argh(switch, short = 'p')]
    /// processes with their parents, by descending priority.
    pub priority: bool,

    #[argh(switch, short = 'i')]
    /// whether each process has a controlling terminal.
    pub interactive: bool,

    #[argh(switch, short = 't')]
    /// processes running more than one thread.
    pub threads: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Priority,
    Interactive,
    Threads,
}

impl Pstatus {
    fn view(&self) -> Result<View, ShellError> {
        match (self.priority, self.interactive, self.threads) {
            (true, false, false) => Ok(View::Priority),
            (false, true, false) => Ok(View::Interactive),
            (false, false, true) => Ok(View::Threads),
            _ => Err(ShellError::Usage("usage: pstatus -p | -i | -t".to_string())),
        }
    }
}

impl CommandInfo for Pstatus {
    fn name() -> &'static str {
        "pstatus"
    }

    fn summary() -> &'static str {
        "pstatus -p | -i | -t: processes by priority, by terminal, or with several threads"
    }
}

impl BuiltinCommand for Pstatus {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let view = self.view()?;
        let table = ProcTable::new(&env.config.proc_root);
        debug!(?view, root = %table.root().display(), "pstatus");
        match view {
            View::Priority => render_priority(table.snapshot()?, stdout)?,
            View::Interactive => render_interactive(&table.snapshot()?, stdout)?,
            View::Threads => render_threads(&table, stdout)?,
        }
        Ok(STATUS_OK)
    }
}

/// Highest priority first; ties keep directory order.
fn render_priority(mut records: Vec<ProcessRecord>, out: &mut dyn Write) -> Result<()> {
    records.sort_by(|a, b| b.priority.cmp(&a.priority));
    writeln!(out, "PID\tPPID\tPriority")?;
    for r in &records {
        writeln!(out, "{}\t{}\t{}", r.pid, r.ppid, r.priority)?;
    }
    Ok(())
}

fn render_interactive(records: &[ProcessRecord], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "PID\tInteractive")?;
    for r in records {
        let answer = if r.tty_nr > 0 { "Yes" } else { "No" };
        writeln!(out, "{}\t{}", r.pid, answer)?;
    }
    Ok(())
}

fn render_threads(table: &ProcTable, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "PID\tThreads")?;
    for pid in table.pids()? {
        match table.thread_count(pid) {
            Some(count) if count > 1 => writeln!(out, "{pid}\t{count}")?,
            _ => {}
        }
    }
    Ok(())
}

#[derive(FromArgs)]
/// Show CPU, memory and kernel facts plus the busiest processes.
pub struct Sysfo {}

impl CommandInfo for Sysfo {
    fn name() -> &'static str {
        "sysfo"
    }

    fn summary() -> &'static str {
        "show system information"
    }
}

impl BuiltinCommand for Sysfo {
    fn execute(
        self,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let table = ProcTable::new(&env.config.proc_root);
        writeln!(stdout, "System Information:")?;

        let cpuinfo = table.read("cpuinfo").ok();
        let meminfo = table.read("meminfo").ok();
        for (text, key) in [
            (&cpuinfo, "model name"),
            (&cpuinfo, "cpu cores"),
            (&meminfo, "MemTotal"),
            (&meminfo, "MemFree"),
        ] {
            if let Some(line) = text.as_deref().and_then(|t| first_line_with(t, key)) {
                writeln!(stdout, "{line}")?;
            }
        }
        match table.read("sys/kernel/osrelease") {
            Ok(release) => writeln!(stdout, "{}", release.trim())?,
            Err(e) => debug!("kernel release unavailable: {e}"),
        }

        writeln!(stdout)?;
        writeln!(stdout, "Current top processes:")?;
        match table.snapshot() {
            Ok(records) => render_top(records, env.config.top_processes, stdout)?,
            Err(e) => debug!("process table unavailable: {e}"),
        }
        Ok(STATUS_OK)
    }
}

fn first_line_with<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find(|line| line.starts_with(key))
}

/// Busiest processes by accumulated CPU ticks.
fn render_top(mut records: Vec<ProcessRecord>, limit: usize, out: &mut dyn Write) -> Result<()> {
    records.sort_by(|a, b| b.cpu_ticks.cmp(&a.cpu_ticks));
    writeln!(out, "PID\tCOMMAND\tCPU\tRSS")?;
    for r in records.iter().take(limit) {
        writeln!(out, "{}\t{}\t{}\t{}", r.pid, r.comm, r.cpu_ticks, r.rss_pages)?;
    }
    Ok(())
}
