//! The `nw` builtin: network session and traffic report, plus link control
//! through a privileged system call.

use crate::builtin::BuiltinCommand;
use crate::command::{CommandInfo, ExitCode, STATUS_OK};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{self, Launch, WaitOutcome};
use crate::procfs::{self, ProcTable};
use anyhow::Result;
use argh::FromArgs;
use std::io::{self, Write};
use std::time::Instant;
use tracing::{info, warn};

/// Operation codes understood by the network control call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ControlOp {
    Stop = 1,
    Start = 2,
    ResetCounters = 3,
    Report = 4,
}

/// Seam between `nw` and the kernel.
pub trait NetControl {
    /// Issue one control operation. Only success or failure is meaningful.
    fn call(&self, op: ControlOp) -> io::Result<()>;

    /// Bring `interface` up or down.
    fn set_link(&self, interface: &str, up: bool, out: &mut dyn Write) -> Result<(), ShellError>;
}

/// The real thing: a raw system call plus `ip link`.
pub struct SyscallControl {
    number: i64,
}

impl SyscallControl {
    pub fn new(number: i64) -> Self {
        Self { number }
    }
}

impl NetControl for SyscallControl {
    fn call(&self, op: ControlOp) -> io::Result<()> {
        // SAFETY: the call takes a single integer argument and touches no
        // memory owned by this process.
        let ret = unsafe { libc::syscall(self.number as libc::c_long, op as i64 as libc::c_long) };
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn set_link(&self, interface: &str, up: bool, out: &mut dyn Write) -> Result<(), ShellError> {
        let state = if up { "up" } else { "down" };
        let argv: Vec<String> = ["ip", "link", "set", "dev", interface, state]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match external::launch(&argv, None, false, out)? {
            Launch::Foreground(WaitOutcome::Exited(0)) => {}
            other => warn!(interface, state, ?other, "link change did not succeed"),
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Network status; exactly one flag is required.
pub struct Nw {
    #[argh(switch, short = 'm')]
    /// report sessions, interface traffic and time since the last reset.
    pub measure: bool,

    #[argh(switch, short = 'r')]
    /// reset the measured values.
    pub reset: bool,

    #[argh(switch, short = 'd')]
    /// disconnect from the network.
    pub disconnect: bool,

    #[argh(switch, short = 'c')]
    /// connect to the network.
    pub connect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Measure,
    Reset,
    Disconnect,
    Connect,
}

impl Nw {
    fn verb(&self) -> Result<Verb, ShellError> {
        match (self.measure, self.reset, self.disconnect, self.connect) {
            (true, false, false, false) => Ok(Verb::Measure),
            (false, true, false, false) => Ok(Verb::Reset),
            (false, false, true, false) => Ok(Verb::Disconnect),
            (false, false, false, true) => Ok(Verb::Connect),
            _ => Err(ShellError::Usage("usage: nw -m | -r | -d | -c".to_string())),
        }
    }

    /// Run against an explicit control implementation.
    pub fn run(
        self,
        control: &dyn NetControl,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let verb = self.verb()?;
        let op = match verb {
            Verb::Measure => ControlOp::Report,
            Verb::Reset => ControlOp::ResetCounters,
            Verb::Disconnect => ControlOp::Stop,
            Verb::Connect => ControlOp::Start,
        };
        match control.call(op) {
            Ok(()) => info!(?op, "network control call succeeded"),
            Err(e) => {
                warn!(?op, "network control call failed: {e}");
                writeln!(stderr, "minish: nw: control call failed: {e}")?;
            }
        }

        let interface = env.config.interface.clone();
        match verb {
            Verb::Measure => measure(env, &interface, stdout, stderr)?,
            Verb::Reset => env.counters_reset_at = Instant::now(),
            Verb::Disconnect => control.set_link(&interface, false, stdout)?,
            Verb::Connect => control.set_link(&interface, true, stdout)?,
        }
        Ok(STATUS_OK)
    }
}

fn measure(
    env: &Environment,
    interface: &str,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    let table = ProcTable::new(&env.config.proc_root);

    let mut entries = procfs::parse_tcp_table(&table.read("net/tcp")?)?;
    // IPv6 may be disabled; the table is then simply absent.
    if let Ok(text) = table.read("net/tcp6") {
        entries.extend(procfs::parse_tcp_table(&text)?);
    }
    let sessions = procfs::count_sessions(&entries);
    writeln!(stdout, "Number of incoming sessions: {}", sessions.incoming)?;
    writeln!(stdout, "Number of outgoing sessions: {}", sessions.outgoing)?;

    match procfs::parse_net_dev(&table.read("net/dev")?, interface)? {
        Some(counters) => {
            writeln!(stdout, "Incoming traffic on {interface}: {} bytes", counters.rx_bytes)?;
            writeln!(stdout, "Outgoing traffic on {interface}: {} bytes", counters.tx_bytes)?;
        }
        None => {
            let err = ShellError::InterfaceNotFound(interface.to_string());
            writeln!(stderr, "minish: nw: {err}")?;
        }
    }

    let elapsed = env.counters_reset_at.elapsed();
    writeln!(stdout, "Time since last reset: {} microseconds", elapsed.as_micros())?;
    Ok(())
}

impl CommandInfo for Nw {
    fn name() -> &'static str {
        "nw"
    }

    fn summary() -> &'static str {
        "nw -m | -r | -d | -c: measure, reset, disconnect or connect the network"
    }
}

impl BuiltinCommand for Nw {
    fn execute(
        self,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let control = SyscallControl::new(env.config.control_syscall);
        self.run(&control, stdout, stderr, env)
    }
}
