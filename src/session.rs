//! The current sheet of a command line session and the meta commands
//! (`:sheets`, `:switch`, ...) that move between sheets.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use mathsheet_core::{Cell, SheetInfo, SheetService};
use tracing::debug;

use crate::config::DisplaySettings;
use crate::render::render_output;

pub const META_HELP: &str = "\
Meta commands:
  :sheets            List sheets
  :new [name]        Create a sheet and switch to it
  :switch <name|id>  Switch to another sheet
  :rename <name>     Rename the current sheet
  :delete            Delete the current sheet
  :rerun             Evaluate every cell of the current sheet again
  :help              Show this help
  :quit              Leave";

/// What the REPL should do after a line.
#[derive(Debug, PartialEq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct Session {
    pub service: SheetService,
    pub sheet: SheetInfo,
    pub display: DisplaySettings,
    /// Sheets whose definitions are live in this process.
    restored: HashSet<String>,
}

impl Session {
    /// Open the sheet named `sheet_name` (created if missing) or the first one.
    pub async fn open(
        service: SheetService,
        sheet_name: Option<&str>,
        display: DisplaySettings,
    ) -> Result<Self> {
        let first = service.initialize()?;
        let sheet = match sheet_name {
            Some(name) => match service.find_sheet(name)? {
                Some(sheet) => sheet,
                None => service.create_sheet(Some(name))?,
            },
            None => first,
        };
        let mut session = Session {
            service,
            sheet,
            display,
            restored: HashSet::new(),
        };
        session.restore().await?;
        Ok(session)
    }

    /// Replay stored cells once so the sheet's definitions are available.
    async fn restore(&mut self) -> Result<()> {
        if self.restored.insert(self.sheet.id.clone())
            && !self.service.cells(&self.sheet.id)?.is_empty()
        {
            debug!(sheet = %self.sheet.name, "replaying stored cells");
            self.service.reevaluate_sheet(&self.sheet.id).await?;
        }
        Ok(())
    }

    pub fn next_cell_number(&self) -> Result<usize> {
        Ok(self.service.cells(&self.sheet.id)?.len() + 1)
    }

    pub fn render(&self, cell: &Cell) -> String {
        render_output(
            &cell.output,
            &self.sheet.id,
            self.service.dispatcher(),
            &self.display,
        )
    }

    /// Evaluate one input as a new cell of the current sheet.
    pub async fn run_cell(&self, input: &str) -> Result<Cell> {
        Ok(self.service.add_cell(&self.sheet.id, input).await?)
    }

    async fn switch_to(&mut self, sheet: SheetInfo) -> Result<()> {
        self.sheet = sheet;
        self.restore().await
    }

    /// Handle a `:` line, returning the text to show.
    pub async fn meta(&mut self, line: &str) -> Result<(String, Control)> {
        let line = line.trim_start_matches(':').trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let text = match command {
            "q" | "quit" | "exit" => return Ok((String::new(), Control::Quit)),
            "help" | "h" => META_HELP.to_string(),
            "sheets" | "ls" => self
                .service
                .sheets()?
                .iter()
                .map(|s| {
                    let marker = if s.id == self.sheet.id { '*' } else { ' ' };
                    format!("{} {} ({})", marker, s.name, s.id)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            "new" => {
                let name = (!rest.is_empty()).then_some(rest);
                let sheet = self.service.create_sheet(name)?;
                let text = format!("Created {}", sheet.name);
                self.switch_to(sheet).await?;
                text
            }
            "switch" | "s" => {
                if rest.is_empty() {
                    bail!(":switch needs a sheet name or id");
                }
                let sheet = self
                    .service
                    .find_sheet(rest)?
                    .with_context(|| format!("No sheet named '{}'", rest))?;
                let text = format!("Switched to {}", sheet.name);
                self.switch_to(sheet).await?;
                text
            }
            "rename" => {
                self.service.rename_sheet(&self.sheet.id, rest)?;
                self.sheet = self.service.sheet(&self.sheet.id)?;
                format!("Renamed to {}", self.sheet.name)
            }
            "delete" => {
                let name = self.sheet.name.clone();
                self.service.delete_sheet(&self.sheet.id)?;
                self.restored.remove(&self.sheet.id);
                let next = self.service.initialize()?;
                let text = format!("Deleted {}, now on {}", name, next.name);
                self.switch_to(next).await?;
                text
            }
            "rerun" => {
                let cells = self.service.reevaluate_sheet(&self.sheet.id).await?;
                cells
                    .iter()
                    .map(|cell| format!("Out [{}]: {}", cell.cell_number, self.render(cell)))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            other => bail!("Unknown command :{} (try :help)", other),
        };
        Ok((text, Control::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathsheet_core::{CellOutput, FileStore, MemoryStore, NotebookConfig};

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    async fn memory_session() -> Session {
        let service = SheetService::new(MemoryStore::new(), NotebookConfig::default());
        Session::open(service, None, DisplaySettings::default()).await.unwrap()
    }

    #[test]
    fn sheet_management() {
        block_on(async {
            let mut session = memory_session().await;
            assert_eq!(session.sheet.name, "Sheet 1");

            let (text, _) = session.meta(":new Algebra").await.unwrap();
            assert_eq!(text, "Created Algebra");
            assert_eq!(session.sheet.name, "Algebra");

            let (text, _) = session.meta(":sheets").await.unwrap();
            assert!(text.contains("  Sheet 1"));
            assert!(text.contains("* Algebra"));

            session.meta(":switch sheet 1").await.unwrap();
            assert_eq!(session.sheet.name, "Sheet 1");
            session.meta(":rename Main").await.unwrap();
            assert_eq!(session.sheet.name, "Main");

            let (text, _) = session.meta(":delete").await.unwrap();
            assert_eq!(text, "Deleted Main, now on Algebra");
            assert!(session.meta(":delete").await.is_err());
            assert!(session.meta(":switch nowhere").await.is_err());
            assert!(session.meta(":bogus").await.is_err());
            assert_eq!(session.meta(":quit").await.unwrap().1, Control::Quit);
        });
    }

    #[test]
    fn cells_and_rerun() {
        block_on(async {
            let mut session = memory_session().await;
            let cell = session.run_cell("k = 7").await.unwrap();
            assert_eq!(session.render(&cell), "k = 7");
            assert_eq!(session.next_cell_number().unwrap(), 2);
            session.run_cell("k * 2").await.unwrap();

            let (text, _) = session.meta(":rerun").await.unwrap();
            assert_eq!(text, "Out [1]: k = 7\nOut [2]: 14");
        });
    }

    #[test]
    fn persisted_sheets_are_replayed_on_open() {
        let dir = std::env::temp_dir().join(format!("mathsheet_session_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        block_on(async {
            let service = SheetService::new(FileStore::open(&dir).unwrap(), NotebookConfig::default());
            let session = Session::open(service, Some("Saved"), DisplaySettings::default())
                .await
                .unwrap();
            session.run_cell("f(x) = 3x").await.unwrap();

            let service = SheetService::new(FileStore::open(&dir).unwrap(), NotebookConfig::default());
            let session = Session::open(service, Some("saved"), DisplaySettings::default())
                .await
                .unwrap();
            let cell = session.run_cell("f(2)").await.unwrap();
            assert_eq!(cell.output, CellOutput::Text("6".into()));
            assert_eq!(cell.cell_number, 2);
        });

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
