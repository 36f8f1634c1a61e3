//! Sheets and their cells.
//!
//! This module provides:
//! - [`SheetInfo`] / [`Cell`]: The persisted notebook model
//! - [`SheetService`]: Sheet CRUD plus cell evaluation through the [`Dispatcher`]
//!
//! Everything is persisted as JSON through a [`KeyValueStore`]: the sheet
//! list under `math-sheets`, each sheet's cells under `sheet-data-<id>`.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NotebookConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{NotebookError, Result};
use crate::output::CellOutput;
use crate::storage::{KeyValueStore, SHEET_DATA_PREFIX, SHEET_LIST_KEY, sheet_data_key};

const SHEET_NAME_PREFIX: &str = "Sheet";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,
    pub content: String,
    pub output: CellOutput,
    pub cell_number: usize,
    pub is_formula: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SheetData {
    cells: Vec<Cell>,
}

fn operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+\-*/^()√∫∑]").expect("operator regex must compile"))
}

/// Whether a cell's input reads as math rather than plain text.
pub fn is_formula(content: &str) -> bool {
    content.contains('=') || operator_re().is_match(content)
}

/// Millisecond timestamp ids, bumped when two are issued in the same millisecond.
fn next_id() -> String {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_millis();
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let id = now.max(last + 1);
        match LAST.compare_exchange_weak(last, id, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return id.to_string(),
            Err(current) => last = current,
        }
    }
}

pub struct SheetService {
    store: Box<dyn KeyValueStore>,
    dispatcher: Dispatcher,
}

impl SheetService {
    pub fn new(store: impl KeyValueStore + 'static, config: NotebookConfig) -> Self {
        Self::with_dispatcher(store, Dispatcher::new(config))
    }

    pub fn with_dispatcher(store: impl KeyValueStore + 'static, dispatcher: Dispatcher) -> Self {
        SheetService {
            store: Box::new(store),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Make sure at least one sheet exists and return the first one.
    pub fn initialize(&self) -> Result<SheetInfo> {
        match self.sheets()?.into_iter().next() {
            Some(sheet) => Ok(sheet),
            None => self.create_sheet(None),
        }
    }

    pub fn sheets(&self) -> Result<Vec<SheetInfo>> {
        match self.store.get(SHEET_LIST_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_sheets(&self, sheets: &[SheetInfo]) -> Result<()> {
        self.store.set(SHEET_LIST_KEY, &serde_json::to_string(sheets)?)
    }

    pub fn sheet(&self, sheet_id: &str) -> Result<SheetInfo> {
        self.sheets()?
            .into_iter()
            .find(|s| s.id == sheet_id)
            .ok_or_else(|| NotebookError::Sheet(format!("Sheet '{}' not found", sheet_id)))
    }

    /// Look a sheet up by id, or by name ignoring case.
    pub fn find_sheet(&self, id_or_name: &str) -> Result<Option<SheetInfo>> {
        let sheets = self.sheets()?;
        let by_id = sheets.iter().find(|s| s.id == id_or_name);
        let by_name = || {
            sheets
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(id_or_name.trim()))
        };
        Ok(by_id.or_else(by_name).cloned())
    }

    /// Create a sheet, named `Sheet N` unless a name is given.
    pub fn create_sheet(&self, name: Option<&str>) -> Result<SheetInfo> {
        let mut sheets = self.sheets()?;
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", SHEET_NAME_PREFIX, sheets.len() + 1),
        };
        let sheet = SheetInfo {
            id: next_id(),
            name,
            created_at: Utc::now(),
        };
        sheets.push(sheet.clone());
        self.save_sheets(&sheets)?;
        info!(sheet_id = %sheet.id, name = %sheet.name, "created sheet");
        Ok(sheet)
    }

    pub fn rename_sheet(&self, sheet_id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NotebookError::Sheet("Sheet name cannot be empty".to_string()));
        }
        let mut sheets = self.sheets()?;
        let sheet = sheets
            .iter_mut()
            .find(|s| s.id == sheet_id)
            .ok_or_else(|| NotebookError::Sheet(format!("Sheet '{}' not found", sheet_id)))?;
        sheet.name = name.to_string();
        self.save_sheets(&sheets)
    }

    /// Delete a sheet with its cells and evaluation state. The last
    /// remaining sheet cannot be deleted.
    pub fn delete_sheet(&self, sheet_id: &str) -> Result<()> {
        let mut sheets = self.sheets()?;
        if sheets.len() <= 1 {
            return Err(NotebookError::Sheet("Cannot delete the last sheet".to_string()));
        }
        sheets.retain(|s| s.id != sheet_id);
        self.save_sheets(&sheets)?;
        self.store.remove(&sheet_data_key(sheet_id))?;

        let state = self.dispatcher.state();
        state.memory.clear_sheet(sheet_id);
        state.scopes.remove_sheet(sheet_id);
        info!(sheet_id, "deleted sheet");
        Ok(())
    }

    /// Remove every sheet and all evaluation state.
    pub fn clear_all(&self) -> Result<()> {
        for sheet in self.sheets()? {
            self.dispatcher.state().clear_sheet(&sheet.id);
        }
        for key in self.store.keys()? {
            if key == SHEET_LIST_KEY || key.starts_with(SHEET_DATA_PREFIX) {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }

    pub fn cells(&self, sheet_id: &str) -> Result<Vec<Cell>> {
        match self.store.get(&sheet_data_key(sheet_id))? {
            Some(json) => Ok(serde_json::from_str::<SheetData>(&json)?.cells),
            None => Ok(Vec::new()),
        }
    }

    fn save_cells(&self, sheet_id: &str, cells: Vec<Cell>) -> Result<()> {
        let json = serde_json::to_string(&SheetData { cells })?;
        self.store.set(&sheet_data_key(sheet_id), &json)
    }

    fn validate_input(&self, input: &str) -> Result<()> {
        let max = self.dispatcher.config().input.max_length;
        if input.chars().count() > max {
            return Err(NotebookError::Sheet(format!(
                "Input is too long (max {} characters)",
                max
            )));
        }
        Ok(())
    }

    async fn evaluate(&self, sheet_id: &str, cell: &mut Cell) {
        let mut output = CellOutput::default();
        self.dispatcher
            .process_input(&cell.content, sheet_id, cell.cell_number, &mut output)
            .await;
        cell.output = output;
        cell.timestamp = Utc::now();
    }

    /// Evaluate `input` as the next cell of a sheet and persist it.
    pub async fn add_cell(&self, sheet_id: &str, input: &str) -> Result<Cell> {
        self.validate_input(input)?;
        self.sheet(sheet_id)?;

        let mut cells = self.cells(sheet_id)?;
        let content = input.trim().to_string();
        let mut cell = Cell {
            id: next_id(),
            is_formula: is_formula(&content),
            content,
            output: CellOutput::Empty,
            cell_number: cells.len() + 1,
            timestamp: Utc::now(),
        };
        self.evaluate(sheet_id, &mut cell).await;
        debug!(sheet_id, cell_number = cell.cell_number, "added cell");

        cells.push(cell.clone());
        self.save_cells(sheet_id, cells)?;
        Ok(cell)
    }

    /// Replace a cell's input and evaluate it again.
    pub async fn update_cell(&self, sheet_id: &str, cell_id: &str, content: &str) -> Result<Cell> {
        self.validate_input(content)?;
        let mut cells = self.cells(sheet_id)?;
        let cell = find_cell(&mut cells, cell_id)?;
        cell.content = content.trim().to_string();
        cell.is_formula = is_formula(&cell.content);
        self.evaluate(sheet_id, cell).await;

        let updated = cell.clone();
        self.save_cells(sheet_id, cells)?;
        Ok(updated)
    }

    /// Evaluate one existing cell again against the current sheet state.
    pub async fn reevaluate_cell(&self, sheet_id: &str, cell_id: &str) -> Result<Cell> {
        let mut cells = self.cells(sheet_id)?;
        let cell = find_cell(&mut cells, cell_id)?;
        self.evaluate(sheet_id, cell).await;

        let updated = cell.clone();
        self.save_cells(sheet_id, cells)?;
        Ok(updated)
    }

    /// Clear the sheet's state and replay every cell in order.
    pub async fn reevaluate_sheet(&self, sheet_id: &str) -> Result<Vec<Cell>> {
        let mut cells = self.cells(sheet_id)?;
        self.dispatcher.state().clear_sheet(sheet_id);
        for cell in cells.iter_mut() {
            self.evaluate(sheet_id, cell).await;
        }
        self.save_cells(sheet_id, cells.clone())?;
        debug!(sheet_id, cells = cells.len(), "re-evaluated sheet");
        Ok(cells)
    }
}

fn find_cell<'c>(cells: &'c mut [Cell], cell_id: &str) -> Result<&'c mut Cell> {
    cells
        .iter_mut()
        .find(|c| c.id == cell_id)
        .ok_or_else(|| NotebookError::Sheet(format!("Cell '{}' not found", cell_id)))
}
