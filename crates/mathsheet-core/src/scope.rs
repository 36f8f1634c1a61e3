//! Per-sheet evaluation scopes.

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use mathsheet_engine::{Scope, Value};

/// Live runtime bindings, one [`Scope`] per sheet id.
///
/// Scopes are created on first access and only go away through
/// [`ScopeStore::clear_scope`] or [`ScopeStore::remove_sheet`].
#[derive(Debug, Default)]
pub struct ScopeStore {
    scopes: DashMap<String, Scope>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to a sheet's scope, creating it if absent.
    ///
    /// The guard locks the sheet's shard; drop it before touching the store
    /// again.
    pub fn get_scope(&self, sheet_id: &str) -> RefMut<'_, String, Scope> {
        self.scopes.entry(sheet_id.to_string()).or_default()
    }

    /// Run `f` against a sheet's scope without creating it.
    pub fn with_scope<R>(&self, sheet_id: &str, f: impl FnOnce(&Scope) -> R) -> R {
        match self.scopes.get(sheet_id) {
            Some(scope) => f(scope.value()),
            None => f(&Scope::new()),
        }
    }

    pub fn lookup(&self, sheet_id: &str, name: &str) -> Option<Value> {
        self.scopes
            .get(sheet_id)
            .and_then(|scope| scope.get(name).cloned())
    }

    pub fn bind(&self, sheet_id: &str, name: &str, value: Value) {
        self.get_scope(sheet_id).set(name, value);
    }

    pub fn clear_scope(&self, sheet_id: &str) {
        if let Some(mut scope) = self.scopes.get_mut(sheet_id) {
            scope.clear();
        }
    }

    /// Returns true if the binding existed.
    pub fn delete_binding(&self, sheet_id: &str, name: &str) -> bool {
        self.scopes
            .get_mut(sheet_id)
            .is_some_and(|mut scope| scope.remove(name).is_some())
    }

    pub fn remove_sheet(&self, sheet_id: &str) {
        self.scopes.remove(sheet_id);
    }

    /// Copy of a sheet's bindings (empty when the sheet has none).
    pub fn snapshot(&self, sheet_id: &str) -> Scope {
        self.with_scope(sheet_id, Scope::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_are_isolated() {
        let store = ScopeStore::new();
        store.bind("a", "x", Value::Number(5.0));
        assert_eq!(store.lookup("a", "x"), Some(Value::Number(5.0)));
        assert_eq!(store.lookup("b", "x"), None);
        assert!(store.snapshot("b").is_empty());
    }

    #[test]
    fn test_get_scope_creates_lazily() {
        let store = ScopeStore::new();
        assert!(store.get_scope("fresh").is_empty());
        store.get_scope("fresh").set("y", Value::Number(1.0));
        assert_eq!(store.snapshot("fresh").len(), 1);
    }

    #[test]
    fn test_delete_binding() {
        let store = ScopeStore::new();
        store.bind("s", "x", Value::Number(1.0));
        assert!(store.delete_binding("s", "x"));
        assert!(!store.delete_binding("s", "x"));
        assert!(!store.delete_binding("missing", "x"));
    }

    #[test]
    fn test_clear_scope() {
        let store = ScopeStore::new();
        store.bind("s", "x", Value::Number(1.0));
        store.bind("s", "y", Value::Number(2.0));
        store.clear_scope("s");
        assert!(store.snapshot("s").is_empty());
    }
}
