//! mathsheet-core - UI-agnostic notebook model, command dispatch + storage.

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod notebook;
pub mod output;
pub mod scope;
pub mod state;
pub mod storage;

pub use commands::{Command, CommandContext, CommandRegistry};
pub use config::NotebookConfig;
pub use dispatcher::Dispatcher;
pub use error::{NotebookError, Result};
pub use memory::{StoredSymbol, SymbolKind, SymbolMemory};
pub use notebook::{Cell, SheetInfo, SheetService};
pub use output::{CellOutput, Outcome, OutputSink};
pub use scope::ScopeStore;
pub use state::{NotebookState, SheetSnapshot};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

pub use mathsheet_engine::plot::PlotConfig;
