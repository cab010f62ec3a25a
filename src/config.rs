use std::path::PathBuf;

/// Tunables for one shell instance.
///
/// `main.rs` fills this from command-line options; tests usually start from
/// [`ShellConfig::default`] and point `proc_root` at a scratch tree.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Capacity of the variable store.
    pub max_variables: usize,
    /// How many times a `$name` alias may expand into another alias.
    pub max_alias_depth: usize,
    /// Root of the kernel process table, normally `/proc`.
    pub proc_root: PathBuf,
    /// Interface whose byte counters `nw -m` reports.
    pub interface: String,
    /// System call number of the network control call.
    pub control_syscall: i64,
    /// Rows in the `sysfo` top-consumers table.
    pub top_processes: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            max_variables: 100,
            max_alias_depth: 8,
            proc_root: PathBuf::from("/proc"),
            interface: "ens33".to_string(),
            control_syscall: 333,
            top_processes: 10,
        }
    }
}
