//! Plugin registry for livefs content routines
//!
//! The merge and unmerge triggers never call the filesystem code directly.
//! They look up a routine by namespace and name at firing time, so an
//! embedding application can swap in its own implementation (a dry-run
//! printer, a sandboxed writer, ...) without touching the triggers.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::changeset::ChangeSet;
use crate::engine::EngineContext;
use crate::error::{Error, Result};
use crate::fs_ops;

/// Namespace holding livefs content routines.
pub const FS_OPS: &str = "fs_ops";
/// Routine that applies a change-set to the livefs.
pub const MERGE_CONTENTS: &str = "merge_contents";
/// Routine that removes a change-set from the livefs.
pub const UNMERGE_CONTENTS: &str = "unmerge_contents";

/// A content routine: applies (or removes) a change-set beneath the engine offset.
pub type ContentOp = Rc<dyn Fn(&EngineContext<'_>, &ChangeSet) -> Result<()>>;

/// Routines keyed by `(namespace, name)`.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<(String, String), ContentOp>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the stock `fs_ops` routines.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FS_OPS, MERGE_CONTENTS, fs_ops::merge_contents);
        registry.register(FS_OPS, UNMERGE_CONTENTS, fs_ops::unmerge_contents);
        registry
    }

    /// Register (or replace) a routine.
    pub fn register<F>(&mut self, namespace: &str, name: &str, op: F) -> Option<ContentOp>
    where
        F: Fn(&EngineContext<'_>, &ChangeSet) -> Result<()> + 'static,
    {
        self.plugins
            .insert((namespace.to_string(), name.to_string()), Rc::new(op))
    }

    pub fn get_plugin(&self, namespace: &str, name: &str) -> Result<ContentOp> {
        self.plugins
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::PluginNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.plugins
            .contains_key(&(namespace.to_string(), name.to_string()))
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .plugins
            .keys()
            .map(|(namespace, name)| format!("{}:{}", namespace, name))
            .collect();
        keys.sort();
        f.debug_struct("PluginRegistry").field("plugins", &keys).finish()
    }
}
