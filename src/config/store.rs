//! Configuration store lookups
//!
//! Modules and the scheduler read settings through [`ConfigStore`] using
//! dotted paths such as `modules.core.general.refresh_interval`. Absence of a
//! value is never an error; callers fall back to their own defaults.

use toml::{Table, Value};

/// Key/path lookup service over the agent configuration
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Look up the value at a dotted path, if present
    fn get(&self, path: &str) -> Option<Value>;
}

/// A configuration store that holds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStore;

impl ConfigStore for EmptyStore {
    fn get(&self, _path: &str) -> Option<Value> {
        None
    }
}

/// Resolve a dotted path against a TOML table
///
/// Both nested tables (`[modules.core.general]`) and quoted keys containing
/// dots (`[modules."core.general"]`) resolve for the same path. When both
/// exist the longest matching key wins.
pub fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    lookup_segments(table, &segments)
}

fn lookup_segments<'a>(table: &'a Table, segments: &[&str]) -> Option<&'a Value> {
    for split in (1..=segments.len()).rev() {
        let key = segments[..split].join(".");
        let Some(value) = table.get(&key) else {
            continue;
        };

        let rest = &segments[split..];
        if rest.is_empty() {
            return Some(value);
        }
        if let Value::Table(inner) = value {
            if let Some(found) = lookup_segments(inner, rest) {
                return Some(found);
            }
        }
    }
    None
}

/// Read a string value, ignoring values of any other type
pub fn get_string(store: &dyn ConfigStore, path: &str) -> Option<String> {
    match store.get(path) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}
