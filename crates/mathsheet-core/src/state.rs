//! Shared per-process notebook state handed to the dispatcher and commands.

use mathsheet_engine::{EvalLimits, Scope};

use crate::config::NotebookConfig;
use crate::memory::{StoredSymbol, SymbolMemory};
use crate::scope::ScopeStore;

#[derive(Debug, Default)]
pub struct NotebookState {
    pub scopes: ScopeStore,
    pub memory: SymbolMemory,
    pub config: NotebookConfig,
}

/// Point-in-time copy of one sheet's scope and symbol memory.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetSnapshot {
    pub scope: Scope,
    pub symbols: Vec<StoredSymbol>,
}

impl NotebookState {
    pub fn new(config: NotebookConfig) -> Self {
        NotebookState {
            scopes: ScopeStore::new(),
            memory: SymbolMemory::new(),
            config,
        }
    }

    pub fn eval_limits(&self) -> EvalLimits {
        self.config.eval_limits()
    }

    /// Forget every binding and stored definition of a sheet.
    pub fn clear_sheet(&self, sheet_id: &str) {
        self.scopes.clear_scope(sheet_id);
        self.memory.clear_sheet(sheet_id);
    }

    /// Remove a symbol from both stores. Returns true if either held it.
    pub fn delete_symbol(&self, sheet_id: &str, name: &str) -> bool {
        let in_scope = self.scopes.delete_binding(sheet_id, name);
        let in_memory = self.memory.delete_symbol(sheet_id, name);
        in_scope || in_memory
    }

    pub fn snapshot(&self, sheet_id: &str) -> SheetSnapshot {
        SheetSnapshot {
            scope: self.scopes.snapshot(sheet_id),
            symbols: self.memory.get_all_symbols(sheet_id),
        }
    }
}
