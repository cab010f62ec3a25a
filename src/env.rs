use crate::config::ShellConfig;
use crate::error::ShellError;
use std::env as stdenv;
use std::path::PathBuf;
use std::time::Instant;

/// One shell-local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// Bounded, insertion-ordered mapping from variable name to value.
///
/// Lookups are a linear scan in insertion order. Names are compared exactly,
/// with no case folding or trimming.
#[derive(Debug, Clone)]
pub struct VariableStore {
    entries: Vec<Variable>,
    capacity: usize,
}

impl VariableStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Overwrite `name` if present, otherwise append it.
    ///
    /// Fails with [`ShellError::VariableStoreFull`] when the store is full and
    /// `name` is new; an existing name can always be updated.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ShellError> {
        if let Some(var) = self.entries.iter_mut().find(|v| v.name == name) {
            var.value = value.to_string();
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            return Err(ShellError::VariableStoreFull {
                capacity: self.capacity,
            });
        }
        self.entries.push(Variable {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }
}

/// Mutable state shared by every command of one shell instance.
///
/// - `vars`: shell-local variables (`set` / `get` / `$name`).
/// - `current_dir`: the working directory, kept in sync with the process cwd.
/// - `config`: limits and kernel-table locations.
/// - `counters_reset_at`: when `nw -r` last restarted the traffic clock.
/// - `should_exit`: set by `quit`; the read-eval loop stops when it sees it.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: VariableStore,
    pub current_dir: PathBuf,
    pub config: ShellConfig,
    pub counters_reset_at: Instant,
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current working directory and start the traffic clock.
    pub fn new(config: ShellConfig) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars: VariableStore::with_capacity(config.max_variables),
            current_dir,
            config,
            counters_reset_at: Instant::now(),
            should_exit: false,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_value() {
        let mut store = VariableStore::with_capacity(4);

        // initially absent
        assert_eq!(store.get("greet"), None);

        store.set("greet", "hello").unwrap();

        assert_eq!(store.get("greet"), Some("hello"));
    }

    #[test]
    fn test_second_set_overwrites_in_place() {
        let mut store = VariableStore::with_capacity(4);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.set("a", "3").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a"), Some("3"));
        let names: Vec<&str> = store.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_full_store_rejects_new_names_but_allows_updates() {
        let mut store = VariableStore::with_capacity(2);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        let err = store.set("c", "3").unwrap_err();
        assert!(matches!(err, ShellError::VariableStoreFull { capacity: 2 }));
        assert_eq!(store.get("c"), None);

        store.set("b", "20").unwrap();
        assert_eq!(store.get("b"), Some("20"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut store = VariableStore::with_capacity(4);
        store.set("Name", "upper").unwrap();
        assert_eq!(store.get("name"), None);
        assert_eq!(store.get("Name"), Some("upper"));
    }

    #[test]
    fn test_environment_uses_configured_capacity() {
        let config = ShellConfig {
            max_variables: 3,
            ..ShellConfig::default()
        };
        let env = Environment::new(config);
        assert_eq!(env.vars.capacity(), 3);
        assert!(env.vars.is_empty());
        assert!(!env.should_exit);
    }
}
