//! Symbol memory: what the user actually typed for each defined name.
//!
//! The scope only holds runtime values, which cannot be shown back to a
//! person in the form they were written. This store keeps the source text of
//! every definition, per sheet, in definition order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mathsheet_engine::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolKind {
    Function { parameters: Vec<String> },
    Variable { value: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredSymbol {
    pub name: String,
    pub original_expression: String,
    pub kind: SymbolKind,
    pub timestamp: DateTime<Utc>,
    /// Monotonic write counter; orders symbols whose timestamps collide.
    sequence: u64,
}

impl StoredSymbol {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }

    /// Right-hand side of the original definition, if it had one.
    pub fn original_rhs(&self) -> Option<&str> {
        self.original_expression
            .split_once('=')
            .map(|(_, rhs)| rhs.trim())
    }

    /// Friendly redisplay: functions exactly as typed, `a = 2 + 3` for
    /// variables, falling back to the stored value when the original text
    /// has no `=`.
    pub fn display(&self) -> String {
        match (&self.kind, self.original_rhs()) {
            (SymbolKind::Function { .. }, _) => self.original_expression.trim().to_string(),
            (SymbolKind::Variable { .. }, Some(rhs)) => format!("{} = {}", self.name, rhs),
            (SymbolKind::Variable { value }, None) => format!("{} = {}", self.name, value),
        }
    }
}

/// Per-sheet symbol tables.
#[derive(Debug, Default)]
pub struct SymbolMemory {
    sheets: DashMap<String, HashMap<String, StoredSymbol>>,
    sequence: AtomicU64,
}

impl SymbolMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_function(
        &self,
        sheet_id: &str,
        name: &str,
        original_expression: &str,
        parameters: Vec<String>,
    ) {
        self.store(
            sheet_id,
            name,
            original_expression,
            SymbolKind::Function { parameters },
        );
    }

    pub fn store_variable(&self, sheet_id: &str, name: &str, original_expression: &str, value: Value) {
        self.store(
            sheet_id,
            name,
            original_expression,
            SymbolKind::Variable { value },
        );
    }

    /// Overwriting a name moves it to the end of the listing.
    fn store(&self, sheet_id: &str, name: &str, original_expression: &str, kind: SymbolKind) {
        let symbol = StoredSymbol {
            name: name.to_string(),
            original_expression: original_expression.to_string(),
            kind,
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.sheets
            .entry(sheet_id.to_string())
            .or_default()
            .insert(name.to_string(), symbol);
    }

    pub fn get_symbol(&self, sheet_id: &str, name: &str) -> Option<StoredSymbol> {
        self.sheets
            .get(sheet_id)
            .and_then(|symbols| symbols.get(name).cloned())
    }

    pub fn has_symbol(&self, sheet_id: &str, name: &str) -> bool {
        self.sheets
            .get(sheet_id)
            .is_some_and(|symbols| symbols.contains_key(name))
    }

    /// All symbols of a sheet in definition order.
    pub fn get_all_symbols(&self, sheet_id: &str) -> Vec<StoredSymbol> {
        let mut all: Vec<StoredSymbol> = self
            .sheets
            .get(sheet_id)
            .map(|symbols| symbols.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|s| s.sequence);
        all
    }

    pub fn get_functions(&self, sheet_id: &str) -> Vec<StoredSymbol> {
        self.get_all_symbols(sheet_id)
            .into_iter()
            .filter(StoredSymbol::is_function)
            .collect()
    }

    pub fn get_variables(&self, sheet_id: &str) -> Vec<StoredSymbol> {
        self.get_all_symbols(sheet_id)
            .into_iter()
            .filter(|s| !s.is_function())
            .collect()
    }

    /// Returns true if the symbol existed.
    pub fn delete_symbol(&self, sheet_id: &str, name: &str) -> bool {
        self.sheets
            .get_mut(sheet_id)
            .is_some_and(|mut symbols| symbols.remove(name).is_some())
    }

    pub fn clear_sheet(&self, sheet_id: &str) {
        self.sheets.remove(sheet_id);
    }

    /// Human-readable listing used by `help`.
    pub fn symbols_summary(&self, sheet_id: &str) -> String {
        let functions = self.get_functions(sheet_id);
        let variables = self.get_variables(sheet_id);
        if functions.is_empty() && variables.is_empty() {
            return "No symbols defined.".to_string();
        }

        let mut sections = Vec::new();
        if !functions.is_empty() {
            let mut lines = vec!["Defined functions:".to_string()];
            lines.extend(functions.iter().map(|s| format!("  {}", s.display())));
            sections.push(lines.join("\n"));
        }
        if !variables.is_empty() {
            let mut lines = vec!["Defined variables:".to_string()];
            lines.extend(variables.iter().map(|s| format!("  {}", s.display())));
            sections.push(lines.join("\n"));
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let memory = SymbolMemory::new();
        memory.store_function("s", "f", "f(x) = x^2 + 1", vec!["x".to_string()]);
        let f = memory.get_symbol("s", "f").unwrap();
        assert!(f.is_function());
        assert_eq!(f.display(), "f(x) = x^2 + 1");
        assert!(memory.get_symbol("other", "f").is_none());
    }

    #[test]
    fn test_overwrite_moves_to_end() {
        let memory = SymbolMemory::new();
        memory.store_variable("s", "a", "a = 1", Value::Number(1.0));
        memory.store_variable("s", "b", "b = 2", Value::Number(2.0));
        memory.store_variable("s", "a", "a = 3", Value::Number(3.0));
        let names: Vec<String> = memory
            .get_all_symbols("s")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(memory.get_symbol("s", "a").unwrap().display(), "a = 3");
    }

    #[test]
    fn test_filtered_views() {
        let memory = SymbolMemory::new();
        memory.store_variable("s", "a", "a = 1", Value::Number(1.0));
        memory.store_function("s", "g", "g(x, y) = x*y", vec!["x".into(), "y".into()]);
        assert_eq!(memory.get_functions("s").len(), 1);
        assert_eq!(memory.get_variables("s").len(), 1);
        assert_eq!(memory.get_functions("s")[0].display(), "g(x, y) = x*y");
    }

    #[test]
    fn test_function_display_is_verbatim() {
        let memory = SymbolMemory::new();
        memory.store_function("s", "f", " f(x,y)=x*y ", vec!["x".into(), "y".into()]);
        assert_eq!(memory.get_symbol("s", "f").unwrap().display(), "f(x,y)=x*y");
    }

    #[test]
    fn test_variable_display_falls_back_to_value() {
        let memory = SymbolMemory::new();
        memory.store_variable("s", "a", "", Value::Number(4.0));
        assert_eq!(memory.get_symbol("s", "a").unwrap().display(), "a = 4");
    }

    #[test]
    fn test_delete_and_clear() {
        let memory = SymbolMemory::new();
        memory.store_variable("s", "a", "a = 1", Value::Number(1.0));
        assert!(memory.has_symbol("s", "a"));
        assert!(memory.delete_symbol("s", "a"));
        assert!(!memory.delete_symbol("s", "a"));

        memory.store_variable("s", "b", "b = 1", Value::Number(1.0));
        memory.clear_sheet("s");
        assert!(memory.get_all_symbols("s").is_empty());
    }

    #[test]
    fn test_symbols_summary() {
        let memory = SymbolMemory::new();
        assert_eq!(memory.symbols_summary("s"), "No symbols defined.");

        memory.store_variable("s", "a", "a = 2", Value::Number(2.0));
        memory.store_function("s", "f", "f(x) = x + a", vec!["x".into()]);
        assert_eq!(
            memory.symbols_summary("s"),
            "Defined functions:\n  f(x) = x + a\n\nDefined variables:\n  a = 2"
        );
    }
}
