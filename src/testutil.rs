//! Helpers shared by unit tests.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that read or change the process working directory.
pub(crate) fn lock_current_dir() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write a fake `<root>/<pid>/stat` with the given parent, tty and priority.
pub(crate) fn write_stat(root: &Path, pid: u32, ppid: u32, tty_nr: i32, priority: i64) {
    let dir = root.join(pid.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let line = format!(
        "{pid} (proc {pid}) S {ppid} {pid} {pid} {tty_nr} -1 4194304 100 0 0 0 {utime} 3 0 0 {priority} 0 1 0 5000 1000000 {rss} 18446744073709551615\n",
        utime = pid * 10,
        rss = pid * 2,
    );
    std::fs::write(dir.join("stat"), line).unwrap();
}

/// Create `<root>/<pid>/task/<tid>` entries.
pub(crate) fn write_tasks(root: &Path, pid: u32, tids: &[u32]) {
    let task = root.join(pid.to_string()).join("task");
    std::fs::create_dir_all(&task).unwrap();
    for tid in tids {
        std::fs::create_dir_all(task.join(tid.to_string())).unwrap();
    }
}
