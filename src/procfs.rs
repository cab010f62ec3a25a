//! Typed readers for the kernel-exposed tables under `/proc`.
//!
//! Every parser here rejects malformed input with an error instead of
//! guessing. The root directory is configurable so the same code can read a
//! fixture tree in tests.

use crate::error::ShellError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Snapshot of one process, read from `<pid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub priority: i64,
    /// Controlling terminal device number; 0 when the process has none.
    pub tty_nr: i32,
    pub comm: String,
    /// `utime + stime`, in clock ticks.
    pub cpu_ticks: u64,
    /// Resident set size, in pages.
    pub rss_pages: i64,
}

/// Why a `stat` line was rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatError {
    #[error("missing '(comm)' field")]
    MissingComm,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} is not a number: {value:?}")]
    BadNumber { field: &'static str, value: String },
}

// Positions counted from the state field, which directly follows `(comm)`.
const PPID: usize = 1;
const TTY_NR: usize = 4;
const UTIME: usize = 11;
const STIME: usize = 12;
const PRIORITY: usize = 15;
const RSS: usize = 21;

impl ProcessRecord {
    /// Parse one line of `/proc/<pid>/stat`.
    ///
    /// `comm` may contain spaces and parentheses, so it spans from the first
    /// `(` to the last `)`.
    pub fn parse_stat(line: &str) -> Result<Self, StatError> {
        let open = line.find('(').ok_or(StatError::MissingComm)?;
        let close = line.rfind(')').ok_or(StatError::MissingComm)?;
        if close < open {
            return Err(StatError::MissingComm);
        }
        let pid = number("pid", line[..open].trim())?;
        let comm = line[open + 1..close].to_string();
        let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();

        let field = |idx: usize, name: &'static str| -> Result<&str, StatError> {
            rest.get(idx).copied().ok_or(StatError::MissingField(name))
        };
        let utime: u64 = number("utime", field(UTIME, "utime")?)?;
        let stime: u64 = number("stime", field(STIME, "stime")?)?;

        Ok(Self {
            pid,
            ppid: number("ppid", field(PPID, "ppid")?)?,
            priority: number("priority", field(PRIORITY, "priority")?)?,
            tty_nr: number("tty_nr", field(TTY_NR, "tty_nr")?)?,
            comm,
            cpu_ticks: utime + stime,
            rss_pages: number("rss", field(RSS, "rss")?)?,
        })
    }
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, StatError> {
    value.parse().map_err(|_| StatError::BadNumber {
        field,
        value: value.to_string(),
    })
}

/// Handle on a process table rooted at some directory (normally `/proc`).
#[derive(Debug, Clone)]
pub struct ProcTable {
    root: PathBuf,
}

impl ProcTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Numeric entries of the root, in directory-stream order.
    pub fn pids(&self) -> Result<Vec<u32>, ShellError> {
        numeric_entries(&self.root)
    }

    /// Read and parse every process.
    ///
    /// Processes that disappear mid-scan are skipped; malformed stat lines are
    /// logged and skipped.
    pub fn snapshot(&self) -> Result<Vec<ProcessRecord>, ShellError> {
        let mut records = Vec::new();
        for pid in self.pids()? {
            let path = self.root.join(pid.to_string()).join("stat");
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let line = text.lines().next().unwrap_or_default();
            match ProcessRecord::parse_stat(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), "skipping malformed stat: {e}"),
            }
        }
        Ok(records)
    }

    /// Number of numeric entries under `<pid>/task`, or `None` if unreadable.
    pub fn thread_count(&self, pid: u32) -> Option<usize> {
        let task = self.root.join(pid.to_string()).join("task");
        numeric_entries(&task).ok().map(|tids| tids.len())
    }

    /// Read a file relative to the root, e.g. `"meminfo"` or `"net/dev"`.
    pub fn read(&self, relative: &str) -> Result<String, ShellError> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).map_err(|e| ShellError::Proc {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn numeric_entries(dir: &Path) -> Result<Vec<u32>, ShellError> {
    let entries = fs::read_dir(dir).map_err(|e| ShellError::Proc {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .collect())
}

/// TCP socket states we care about, from `include/net/tcp_states.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Established,
    Listen,
    Other(u8),
}

impl TcpState {
    fn from_code(code: u8) -> Self {
        match code {
            0x01 => TcpState::Established,
            0x0A => TcpState::Listen,
            other => TcpState::Other(other),
        }
    }
}

/// One row of `net/tcp` or `net/tcp6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpEntry {
    pub local_port: u16,
    pub state: TcpState,
}

/// Parse a `net/tcp`-style table. The header line is skipped.
pub fn parse_tcp_table(text: &str) -> Result<Vec<TcpEntry>, ShellError> {
    let bad = |line: &str| ShellError::Proc {
        path: "net/tcp".to_string(),
        reason: format!("malformed row: {}", line.trim()),
    };
    let mut rows = Vec::new();
    for line in text.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(local), Some(state)) = (fields.get(1), fields.get(3)) else {
            return Err(bad(line));
        };
        let port = local
            .rsplit_once(':')
            .and_then(|(_, port)| u16::from_str_radix(port, 16).ok())
            .ok_or_else(|| bad(line))?;
        let code = u8::from_str_radix(state, 16).map_err(|_| bad(line))?;
        rows.push(TcpEntry {
            local_port: port,
            state: TcpState::from_code(code),
        });
    }
    Ok(rows)
}

/// Incoming and outgoing established sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub incoming: usize,
    pub outgoing: usize,
}

/// Classify established connections: a local port that something listens on
/// means the peer connected to us.
pub fn count_sessions(entries: &[TcpEntry]) -> SessionCounts {
    let listening: HashSet<u16> = entries
        .iter()
        .filter(|e| e.state == TcpState::Listen)
        .map(|e| e.local_port)
        .collect();
    let mut counts = SessionCounts::default();
    for entry in entries.iter().filter(|e| e.state == TcpState::Established) {
        if listening.contains(&entry.local_port) {
            counts.incoming += 1;
        } else {
            counts.outgoing += 1;
        }
    }
    counts
}

/// Cumulative byte counters of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Find `interface` in a `net/dev` table.
///
/// Returns `Ok(None)` when the interface has no row, an error when its row is
/// malformed.
pub fn parse_net_dev(text: &str, interface: &str) -> Result<Option<InterfaceCounters>, ShellError> {
    for line in text.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        if name.trim() != interface {
            continue;
        }
        let fields: Vec<&str> = counters.split_whitespace().collect();
        let get = |idx: usize| -> Result<u64, ShellError> {
            fields
                .get(idx)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| ShellError::Proc {
                    path: "net/dev".to_string(),
                    reason: format!("malformed row for {interface}"),
                })
        };
        return Ok(Some(InterfaceCounters {
            rx_bytes: get(0)?,
            tx_bytes: get(8)?,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_stat, write_tasks};

    const SAMPLE: &str = "1234 (my (odd) proc) S 1 1234 1234 34816 1234 4194560 1500 0 0 0 40 12 0 0 20 0 1 0 777 9000000 321 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0";

    #[test]
    fn parses_stat_with_parentheses_in_comm() {
        let rec = ProcessRecord::parse_stat(SAMPLE).unwrap();
        assert_eq!(rec.pid, 1234);
        assert_eq!(rec.ppid, 1);
        assert_eq!(rec.comm, "my (odd) proc");
        assert_eq!(rec.tty_nr, 34816);
        assert_eq!(rec.priority, 20);
        assert_eq!(rec.cpu_ticks, 52);
        assert_eq!(rec.rss_pages, 321);
    }

    #[test]
    fn rejects_truncated_stat() {
        let err = ProcessRecord::parse_stat("42 (sh) S 1 42 42").unwrap_err();
        assert_eq!(err, StatError::MissingField("utime"));
    }

    #[test]
    fn rejects_missing_comm_and_bad_numbers() {
        assert_eq!(
            ProcessRecord::parse_stat("42 sh S 1").unwrap_err(),
            StatError::MissingComm
        );
        let err = ProcessRecord::parse_stat("x (sh) S 1").unwrap_err();
        assert!(matches!(err, StatError::BadNumber { field: "pid", .. }));
    }

    #[test]
    fn snapshot_reads_numeric_entries_only() {
        let root = tempfile::tempdir().unwrap();
        write_stat(root.path(), 10, 1, 0, 20);
        write_stat(root.path(), 11, 10, 34816, 5);
        fs::create_dir_all(root.path().join("self")).unwrap();
        fs::write(root.path().join("meminfo"), "MemTotal: 1 kB\n").unwrap();

        let table = ProcTable::new(root.path());
        let mut pids: Vec<u32> = table.snapshot().unwrap().iter().map(|r| r.pid).collect();
        pids.sort();
        assert_eq!(pids, [10, 11]);
    }

    #[test]
    fn snapshot_skips_malformed_records() {
        let root = tempfile::tempdir().unwrap();
        write_stat(root.path(), 10, 1, 0, 20);
        fs::create_dir_all(root.path().join("12")).unwrap();
        fs::write(root.path().join("12").join("stat"), "garbage\n").unwrap();
        fs::create_dir_all(root.path().join("13")).unwrap();

        let records = ProcTable::new(root.path()).snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, 10);
    }

    #[test]
    fn missing_root_is_a_resource_error() {
        let err = ProcTable::new("/definitely/not/here").snapshot().unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn thread_count_counts_numeric_task_entries() {
        let root = tempfile::tempdir().unwrap();
        write_stat(root.path(), 10, 1, 0, 20);
        write_tasks(root.path(), 10, &[10, 15, 16]);
        let table = ProcTable::new(root.path());
        assert_eq!(table.thread_count(10), Some(3));
        assert_eq!(table.thread_count(99), None);
    }

    const TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1 1 0 100 0 0 10 0
   1: 0100007F:0016 0100007F:D431 01 00000000:00000000 00:00000000 00000000     0        0 2 1 0 20 4 30 10 -1
   2: 0100007F:D431 0100007F:0016 01 00000000:00000000 00:00000000 00000000  1000        0 3 1 0 20 4 30 10 -1
   3: 0100007F:A000 5DB8D822:01BB 06 00000000:00000000 00:00000000 00000000  1000        0 0 1 0 20 4 30 10 -1
";

    #[test]
    fn parses_tcp_rows() {
        let rows = parse_tcp_table(TCP).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            TcpEntry {
                local_port: 22,
                state: TcpState::Listen
            }
        );
        assert_eq!(rows[2].local_port, 0xD431);
        assert_eq!(rows[3].state, TcpState::Other(6));
    }

    #[test]
    fn classifies_sessions_by_listening_port() {
        let rows = parse_tcp_table(TCP).unwrap();
        let counts = count_sessions(&rows);
        assert_eq!(
            counts,
            SessionCounts {
                incoming: 1,
                outgoing: 1
            }
        );
    }

    #[test]
    fn tcp6_addresses_parse_too() {
        let text = "header\n 0: 00000000000000000000000000000000:1F90 00000000000000000000000000000000:0000 0A 0 0 0 0\n";
        let rows = parse_tcp_table(text).unwrap();
        assert_eq!(rows[0].local_port, 8080);
    }

    #[test]
    fn malformed_tcp_row_is_rejected() {
        assert!(parse_tcp_table("header\n 0: nonsense\n").is_err());
    }

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
 ens33: 987654    5000    0    0    0     0          0         0   123456    4000    0    0    0     0       0          0
";

    #[test]
    fn reads_interface_counters() {
        let counters = parse_net_dev(NET_DEV, "ens33").unwrap().unwrap();
        assert_eq!(counters.rx_bytes, 987654);
        assert_eq!(counters.tx_bytes, 123456);
        assert_eq!(parse_net_dev(NET_DEV, "eth9").unwrap(), None);
    }
}
