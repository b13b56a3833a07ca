//! Global variable store collaborator.

use std::fmt;
use std::sync::RwLock;

use indexmap::IndexMap;

use promptvar_core::GlobalVariable;

/// Source of variables shared across templates.
pub trait GlobalVariableStore: fmt::Debug + Send + Sync {
    /// Look up a global variable.
    fn get(&self, name: &str) -> Option<GlobalVariable>;

    /// Names of every stored variable.
    fn names(&self) -> Vec<String>;
}

/// Global variables held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryGlobalStore {
    variables: RwLock<IndexMap<String, GlobalVariable>>,
}

impl InMemoryGlobalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable.
    pub fn insert(&self, variable: GlobalVariable) {
        self.variables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(variable.name.clone(), variable);
    }

    /// Remove a variable, returning it.
    pub fn remove(&self, name: &str) -> Option<GlobalVariable> {
        self.variables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(name)
    }

    /// Number of stored variables.
    pub fn len(&self) -> usize {
        self.variables.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<GlobalVariable> for InMemoryGlobalStore {
    fn from_iter<I: IntoIterator<Item = GlobalVariable>>(iter: I) -> Self {
        let store = Self::new();
        for variable in iter {
            store.insert(variable);
        }
        store
    }
}

impl GlobalVariableStore for InMemoryGlobalStore {
    fn get(&self, name: &str) -> Option<GlobalVariable> {
        self.variables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn names(&self) -> Vec<String> {
        self.variables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
