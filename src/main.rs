//! Mathsheet - a math notebook in the terminal

mod config;
mod error;
mod render;
mod repl;
mod session;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mathsheet_core::storage::write_markdown;
use mathsheet_core::{FileStore, MemoryStore, NotebookConfig, SheetService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;
use crate::session::Session;

const LOG_ENV: &str = "MATHSHEET_LOG";

fn print_usage() {
    eprintln!("Usage: mathsheet [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <INPUT>     Evaluate a cell and print its output (can be repeated)");
    eprintln!("  -s, --sheet <NAME>        Sheet to open (created if missing)");
    eprintln!("  --store <DIR>             Keep sheets in DIR instead of memory");
    eprintln!("  -o, --output <FILE>       Export the sheet to a markdown file");
    eprintln!("  -f, --commands <FILE>     Load Rhai script commands (can be repeated)");
    eprintln!("  --no-default-commands     Skip default.rhai from the config directory");
    eprintln!("  --config <FILE>           Read settings from FILE");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    help: bool,
    commands: Vec<String>,
    sheet: Option<String>,
    store: Option<PathBuf>,
    output: Option<PathBuf>,
    script_files: Vec<PathBuf>,
    no_default_commands: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> std::result::Result<Options, CliError> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| CliError::MissingValue(arg.clone()))
        };
        match arg.as_str() {
            "-h" | "--help" => options.help = true,
            "-c" | "--command" => options.commands.push(value()?),
            "-s" | "--sheet" => options.sheet = Some(value()?),
            "--store" => options.store = Some(PathBuf::from(value()?)),
            "-o" | "--output" => options.output = Some(PathBuf::from(value()?)),
            "-f" | "--commands" => options.script_files.push(PathBuf::from(value()?)),
            "--no-default-commands" => options.no_default_commands = true,
            "--config" => options.config = Some(PathBuf::from(value()?)),
            other if other.starts_with('-') => {
                return Err(CliError::UnknownOption(other.to_string()));
            }
            other => return Err(CliError::UnexpectedArgument(other.to_string())),
        }
    }
    Ok(options)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };
    if options.help {
        print_usage();
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(options)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn open_service(store: Option<&Path>, config: NotebookConfig) -> Result<SheetService> {
    Ok(match store {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("Failed to open store {}", dir.display()))?;
            SheetService::new(store, config)
        }
        None => SheetService::new(MemoryStore::new(), config),
    })
}

/// Load `default.rhai` (unless disabled) and every `-f` script.
fn load_scripts(service: &mut SheetService, options: &Options) -> Result<()> {
    let registry = service.dispatcher_mut().registry_mut();

    if !options.no_default_commands
        && let Some(path) = config::default_commands_path()
        && path.is_file()
    {
        match std::fs::read_to_string(&path) {
            Ok(script) => match registry.load_script(&script) {
                Ok(added) => info!(path = %path.display(), added, "loaded default commands"),
                Err(e) => eprintln!("Warning: {}: {}", path.display(), e),
            },
            Err(e) => eprintln!("Warning: Failed to read {}: {}", path.display(), e),
        }
    }

    for path in &options.script_files {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let added = registry
            .load_script(&script)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        if added == 0 {
            warn!(path = %path.display(), "script defines no new commands");
        }
    }
    Ok(())
}

async fn run(options: Options) -> Result<i32> {
    let (config, warnings) = config::load_config(options.config.as_deref());
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }

    let mut service = open_service(options.store.as_deref(), config.notebook)?;
    load_scripts(&mut service, &options)?;
    let mut session = Session::open(service, options.sheet.as_deref(), config.display).await?;

    let mut code = 0;
    if !options.commands.is_empty() {
        for input in &options.commands {
            let cell = session.run_cell(input).await?;
            if cell.output.is_error() {
                code = 1;
            }
            println!("{}", session.render(&cell));
        }
    } else if options.output.is_none() {
        repl::run(&mut session).await?;
    }

    if let Some(path) = &options.output {
        let cells = session.service.cells(&session.sheet.id)?;
        write_markdown(path, &session.sheet, &cells, session.service.dispatcher())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Exported to {}", path.display());
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_repeatable_and_valued_options() {
        let options = parse_args(&args(&[
            "-c", "1 + 1", "--command", "help", "-s", "Work", "--store", "/tmp/ms", "-f", "a.rhai",
            "--commands", "b.rhai", "--no-default-commands", "-o", "out.md", "--config", "c.toml",
        ]))
        .unwrap();
        assert_eq!(options.commands, vec!["1 + 1", "help"]);
        assert_eq!(options.sheet.as_deref(), Some("Work"));
        assert_eq!(options.store, Some(PathBuf::from("/tmp/ms")));
        assert_eq!(
            options.script_files,
            vec![PathBuf::from("a.rhai"), PathBuf::from("b.rhai")]
        );
        assert!(options.no_default_commands);
        assert_eq!(options.output, Some(PathBuf::from("out.md")));
        assert_eq!(options.config, Some(PathBuf::from("c.toml")));
        assert!(!options.help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            parse_args(&args(&["-c"])),
            Err(CliError::MissingValue("-c".into()))
        );
        assert_eq!(
            parse_args(&args(&["--bogus"])),
            Err(CliError::UnknownOption("--bogus".into()))
        );
        assert_eq!(
            parse_args(&args(&["file.md"])),
            Err(CliError::UnexpectedArgument("file.md".into()))
        );
    }

    #[test]
    fn help_flag() {
        assert!(parse_args(&args(&["--help"])).unwrap().help);
        assert_eq!(parse_args(&[]).unwrap(), Options::default());
    }
}
