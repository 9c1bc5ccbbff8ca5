// crates/conflux-cli/src/main.rs
// ============================================================================
// Module: Conflux CLI Entry Point
// Description: Command dispatcher for configuration load and inspection.
// Purpose: Wire the config store to SQLite and expose it to operators.
// Dependencies: clap, conflux-config, conflux-core, conflux-store-sqlite, serde_json
// ============================================================================

//! ## Overview
//! `conflux` is the composition root: it opens the `SQLite` persistence
//! gateway, builds the [`ConfigStore`], runs one reconciliation pass and then
//! executes the requested command. Secrets are only ever printed in redacted
//! form; `export` writes them back with environment references restored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use conflux_config::ConfigAuditSink;
use conflux_config::ConfigStore;
use conflux_config::FileAuditSink;
use conflux_config::LoadReport;
use conflux_config::NoopAuditSink;
use conflux_config::StderrAuditSink;
use conflux_config::resolve_config_path;
use conflux_core::ProcessEnv;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_store_sqlite::SqliteConfigStore;
use conflux_store_sqlite::SqliteStoreConfig;
use conflux_store_sqlite::SqliteStoreMode;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default database file name.
const DEFAULT_DB_PATH: &str = "conflux.db";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "conflux", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the configuration file with the database and print the report.
    Load(StoreArgs),
    /// Print every provider with secrets redacted.
    Providers(StoreArgs),
    /// Write the current configuration to a file with env references restored.
    Export {
        /// Store options.
        #[command(flatten)]
        store: StoreArgs,
        /// Destination file; `.toml` selects TOML, anything else JSON.
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
    },
    /// Print every observed configuration file hash, newest first.
    Hashes(StoreArgs),
}

/// Options shared by every command.
#[derive(Args, Debug)]
struct StoreArgs {
    /// Configuration file (defaults to `CONFLUX_CONFIG`, then `conflux.json`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// `SQLite` database file.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    /// `SQLite` journal mode.
    #[arg(long, value_enum, default_value_t = JournalArg::Wal)]
    journal_mode: JournalArg,
    /// Audit destination.
    #[arg(long, value_enum, default_value_t = AuditArg::None)]
    audit: AuditArg,
    /// Audit log file, required when `--audit file`.
    #[arg(long, value_name = "PATH")]
    audit_log: Option<PathBuf>,
}

/// `SQLite` journal mode selector.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum JournalArg {
    /// Write-ahead logging.
    Wal,
    /// Rollback journal.
    Delete,
}

/// Audit destination selector.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum AuditArg {
    /// Discard audit events.
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to `--audit-log`.
    File,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => command_load(&args),
        Commands::Providers(args) => command_providers(&args),
        Commands::Export {
            store,
            output,
        } => command_export(&store, &output),
        Commands::Hashes(args) => command_hashes(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs one reconciliation pass and prints the report.
fn command_load(args: &StoreArgs) -> CliResult<ExitCode> {
    let (_, report) = open_and_load(args)?;
    write_json(&report)?;
    if report.skipped().next().is_some() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints redacted providers.
fn command_providers(args: &StoreArgs) -> CliResult<ExitCode> {
    let (store, _) = open_and_load(args)?;
    let mut providers: BTreeMap<ProviderName, ProviderConfig> = BTreeMap::new();
    for name in store.list_providers().map_err(|err| CliError::new(err.to_string()))? {
        let config =
            store.provider_config_redacted(&name).map_err(|err| CliError::new(err.to_string()))?;
        providers.insert(name, config);
    }
    write_json(&providers)?;
    Ok(ExitCode::SUCCESS)
}

/// Writes the configuration back to a file.
fn command_export(args: &StoreArgs, output: &Path) -> CliResult<ExitCode> {
    let (store, _) = open_and_load(args)?;
    let written = store.write_config_file(output).map_err(|err| CliError::new(err.to_string()))?;
    write_stdout_line(&format!("wrote {}", written.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the file hash log.
fn command_hashes(args: &StoreArgs) -> CliResult<ExitCode> {
    let store = open_store(args)?;
    let log = store.file_hash_log().map_err(|err| CliError::new(err.to_string()))?;
    write_json(&log)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Opens the store without loading.
fn open_store(args: &StoreArgs) -> CliResult<ConfigStore> {
    let mut sqlite = SqliteStoreConfig::new(&args.db);
    sqlite.journal_mode = match args.journal_mode {
        JournalArg::Wal => SqliteStoreMode::Wal,
        JournalArg::Delete => SqliteStoreMode::Delete,
    };
    let persistence = SqliteConfigStore::new(&sqlite)
        .map_err(|err| CliError::new(format!("failed to open database: {err}")))?;
    let audit: Arc<dyn ConfigAuditSink> = match (args.audit, &args.audit_log) {
        (AuditArg::None, _) => Arc::new(NoopAuditSink),
        (AuditArg::Stderr, _) => Arc::new(StderrAuditSink),
        (AuditArg::File, Some(path)) => Arc::new(
            FileAuditSink::new(path)
                .map_err(|err| CliError::new(format!("failed to open audit log: {err}")))?,
        ),
        (AuditArg::File, None) => {
            return Err(CliError::new("--audit file requires --audit-log".to_string()));
        }
    };
    Ok(ConfigStore::new(Arc::new(persistence), Arc::new(ProcessEnv)).with_audit(audit))
}

/// Opens the store and runs the reconciliation pass.
fn open_and_load(args: &StoreArgs) -> CliResult<(ConfigStore, LoadReport)> {
    let path = resolve_config_path(args.config.as_deref(), &ProcessEnv)
        .map_err(|err| CliError::new(err.to_string()))?;
    let store = open_store(args)?;
    let report = store
        .load_configuration(&path)
        .map_err(|err| CliError::new(format!("load failed: {err}")))?;
    Ok((store, report))
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a value as pretty JSON on stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&rendered)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
