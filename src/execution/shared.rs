//! Per-pipeline table of published shared functions

use crate::core::module::SharedFunction;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A published function and the instance that published it
#[derive(Clone)]
pub struct SharedEntry {
    pub owner: String,
    pub function: SharedFunction,
}

impl fmt::Debug for SharedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEntry")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedFunctionTable {
    entries: BTreeMap<String, SharedEntry>,
}

impl SharedFunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `function` as `name`, returning the entry it displaced
    pub fn add(
        &mut self,
        name: impl Into<String>,
        owner: impl Into<String>,
        function: SharedFunction,
    ) -> Option<SharedEntry> {
        self.entries.insert(
            name.into(),
            SharedEntry {
                owner: owner.into(),
                function,
            },
        )
    }

    pub fn remove(&mut self, name: &str) -> Option<SharedEntry> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<SharedFunction> {
        self.entries.get(name).map(|entry| Rc::clone(&entry.function))
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.owner.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Glue;
    use serde_json::{json, Value};

    fn constant(value: Value) -> SharedFunction {
        Rc::new(move |_glue: &Glue, _args: &[Value]| Ok(value.clone()))
    }

    #[test]
    fn test_add_returns_displaced_entry() {
        let mut table = SharedFunctionTable::new();
        assert!(table.add("foo", "a", constant(json!(1))).is_none());

        let displaced = table.add("foo", "b", constant(json!(2))).unwrap();
        assert_eq!(displaced.owner, "a");
        assert_eq!(table.owner("foo"), Some("b"));
    }

    #[test]
    fn test_remove() {
        let mut table = SharedFunctionTable::new();
        table.add("foo", "a", constant(Value::Null));
        table.add("bar", "a", constant(Value::Null));

        assert!(table.remove("foo").is_some());
        assert!(table.remove("foo").is_none());
        assert!(!table.contains("foo"));
        assert_eq!(table.names(), vec!["bar"]);
    }
}
