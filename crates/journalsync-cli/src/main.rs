//! Journalsync CLI
//!
//! Thin wrapper around journalsync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show journal information
//! journalsync info
//!
//! # Register a parent server that must not receive users
//! journalsync server add hq --role parent --exclude org.openmrs.User
//!
//! # Journal records from a JSON file
//! journalsync record import changes.json
//!
//! # List journaled records
//! journalsync record list
//!
//! # Build a transmission for a server and write it to the outbox
//! journalsync export --server hq --write
//!
//! # Export everything journaled since the last time-window export
//! journalsync export-window --write
//!
//! # Inspect a transmission file
//! journalsync inspect ~/.journalsync/data/outbox/sync_tx_....bin
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use journalsync_core::{
    Journal, RecordId, RemoteServer, SendPolicy, ServerRole, StateLocation, StrategyConfig,
    SyncItem, SyncItemState, SyncRecord, SyncRecordState, SyncSource, SyncStrategy, Transmission,
    TransmissionOptions,
};
use serde::Deserialize;

/// Journalsync - disconnected one-way replication
#[derive(Parser)]
#[command(name = "journalsync")]
#[command(version = "0.1.0")]
#[command(about = "Journalsync - disconnected one-way replication")]
#[command(
    long_about = "Builds file-based transmissions of journaled changes for parent and child servers, withholding records the destination cannot apply."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.journalsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Strategy config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show journal information
    Info,

    /// Remote server management
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Journal record management
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Build a state-based transmission for one server
    Export {
        /// Server ID or nickname
        #[arg(short, long)]
        server: String,
        /// Maximum number of non-deletion records
        #[arg(short, long)]
        max: Option<usize>,
        /// Write the transmission to the outbox
        #[arg(short, long)]
        write: bool,
        /// Ask the server to answer with its own transmission
        #[arg(long)]
        request_response: bool,
    },

    /// Export everything journaled since the last time-window export
    ExportWindow {
        /// Write the transmission to the outbox
        #[arg(short, long)]
        write: bool,
    },

    /// List failure notices
    Notices,

    /// Show the contents of a transmission file
    Inspect {
        /// Path to the transmission file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    /// Register a remote server
    Add {
        /// Nickname of the server
        nickname: String,
        /// Role of the server relative to this one: parent or child
        #[arg(short, long, default_value = "parent")]
        role: String,
        /// Entity type prefix the server must not receive (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Entity type prefix the server accepts (repeatable; default: all)
        #[arg(long)]
        include: Vec<String>,
    },
    /// List registered servers
    List,
    /// Show server details
    Show {
        /// Server ID or nickname
        server: String,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Journal records from a JSON file (one record or an array)
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// List journaled records
    List {
        /// Only show records in this state
        #[arg(short, long)]
        state: Option<String>,
    },
    /// Show record details
    Show {
        /// Record ID
        record_id: String,
    },
    /// Overwrite a record's state
    SetState {
        /// Record ID
        record_id: String,
        /// New state (e.g. NEW, FAILED_AND_STOPPED)
        state: String,
        /// Set the state for this server only (child servers keep their own)
        #[arg(short, long)]
        server: Option<String>,
    },
}

/// Record as written in an import file
#[derive(Deserialize)]
struct ImportRecord {
    #[serde(default)]
    state: Option<SyncRecordState>,
    items: Vec<ImportItem>,
}

#[derive(Deserialize)]
struct ImportItem {
    #[serde(rename = "type")]
    contained_type: String,
    #[serde(default)]
    state: SyncItemState,
    #[serde(default)]
    key: Option<String>,
    /// Record document, either as JSON or as an already-serialized string
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<ImportRecord>),
    One(ImportRecord),
}

impl ImportRecord {
    fn into_record(self) -> Result<SyncRecord> {
        let items = self
            .items
            .into_iter()
            .map(|item| -> Result<SyncItem> {
                let content = match item.content {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => serde_json::to_string(&other)?,
                };
                Ok(SyncItem {
                    contained_type: item.contained_type,
                    state: item.state,
                    key: item.key,
                    content,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let record = SyncRecord::new(items);
        Ok(match self.state {
            Some(state) => record.with_state(state),
            None => record,
        })
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory (~/.journalsync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".journalsync")
        .join("data")
}

/// Load the strategy config, defaulting the outbox to `<data_dir>/outbox`
fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<StrategyConfig> {
    let mut config = match path {
        Some(path) => StrategyConfig::load(path)?,
        None => StrategyConfig::default(),
    };
    if config.transmission_dir.is_none() {
        config.transmission_dir = Some(data_dir.join("outbox"));
    }
    Ok(config)
}

/// Parse a record ID, with or without its `record_` prefix
fn parse_record_id(s: &str) -> Result<RecordId> {
    let raw = s.strip_prefix("record_").unwrap_or(s);
    RecordId::from_string(raw).map_err(|e| anyhow::anyhow!("Invalid record ID '{}': {}", s, e))
}

fn parse_state(s: &str) -> Result<SyncRecordState> {
    SyncRecordState::from_str(s).map_err(|e| anyhow::anyhow!(e))
}

fn find_server(journal: &Journal, server: &str) -> Result<RemoteServer> {
    Ok(journal.require_server(server)?)
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn print_transmission(tx: &Transmission) -> Result<()> {
    println!("Transmission: {}", tx.id);
    println!("  Source: {}", tx.source_id);
    match tx.target_id {
        Some(target) => println!("  Target: {}", target),
        None => println!("  Target: (default peer)"),
    }
    println!("  Created: {}", format_timestamp(tx.created_at));
    println!(
        "  Requesting response: {}",
        if tx.is_requesting_transmission { "Yes" } else { "No" }
    );
    println!("  Checksum: {}", tx.checksum()?);
    println!("  Records: {}", tx.len());
    for record in &tx.records {
        let types: Vec<_> = record.contained_types().into_iter().collect();
        println!("    {} {} [{}]", record.id, record.state, types.join(", "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = load_config(cli.config.as_deref(), &data_dir)?;

    let journal = Journal::open(data_dir.join("journal.redb"))?;

    match cli.command {
        Commands::Info => {
            println!("Journalsync v0.1.0");
            println!();
            println!("Journal:");
            println!("  Source: {}", journal.source_id()?);
            println!("  Records: {}", journal.record_count()?);
            println!("  Head: {}", journal.head()?);
            println!("  Last sync point: {}", journal.last_sync_point()?);
            println!();
            println!("Servers: {}", journal.list_servers()?.len());
            println!("Notices: {}", journal.list_notices()?.len());
            println!();
            println!("Data directory: {}", data_dir.display());
            if let Some(dir) = &config.transmission_dir {
                println!("Outbox: {}", dir.display());
            }
        }

        Commands::Server { action } => match action {
            ServerAction::Add {
                nickname,
                role,
                exclude,
                include,
            } => {
                if journal.find_server(&nickname)?.is_some() {
                    anyhow::bail!("Server already exists: {}", nickname);
                }
                let role = ServerRole::from_str(&role).map_err(|e| anyhow::anyhow!(e))?;
                let policy = SendPolicy {
                    included: include,
                    excluded: exclude,
                };
                let server = RemoteServer::new(&nickname, role).with_policy(policy);
                journal.save_server(&server)?;
                println!("Added server: {}", nickname);
                println!("  ID: {}", server.id);
            }

            ServerAction::List => {
                let servers = journal.list_servers()?;
                if servers.is_empty() {
                    println!("No servers registered.");
                } else {
                    println!("Servers ({}):", servers.len());
                    println!();
                    for server in servers {
                        println!("  {} {} [{}]", server.id, server.nickname, server.role);
                    }
                }
            }

            ServerAction::Show { server } => {
                let server = find_server(&journal, &server)?;
                println!("Server: {}", server.nickname);
                println!("  ID: {}", server.id);
                println!("  Role: {}", server.role);
                if server.policy.included.is_empty() {
                    println!("  Accepts: all types");
                } else {
                    println!("  Accepts: {}", server.policy.included.join(", "));
                }
                if !server.policy.excluded.is_empty() {
                    println!("  Refuses: {}", server.policy.excluded.join(", "));
                }
            }
        },

        Commands::Record { action } => match action {
            RecordAction::Import { file } => {
                let bytes = std::fs::read(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let parsed: ImportFile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Invalid record file {}", file.display()))?;
                let imports = match parsed {
                    ImportFile::Many(records) => records,
                    ImportFile::One(record) => vec![record],
                };

                tracing::info!(file = %file.display(), count = imports.len(), "Importing records");
                println!("Imported {} records:", imports.len());
                for import in imports {
                    let record = import.into_record()?;
                    let position = journal.append(&record)?;
                    println!("  {} {}", position, record.id);
                }
            }

            RecordAction::List { state } => {
                let wanted = state.as_deref().map(parse_state).transpose()?;
                let records: Vec<_> = journal
                    .list_records()?
                    .into_iter()
                    .filter(|(_, r)| wanted.map_or(true, |s| r.state == s))
                    .collect();

                if records.is_empty() {
                    println!("No records found.");
                } else {
                    println!("Records ({}):", records.len());
                    println!();
                    for (position, record) in records {
                        let types: Vec<_> = record.contained_types().into_iter().collect();
                        println!(
                            "  {} {} {} [{}]",
                            position,
                            record.id,
                            record.state,
                            types.join(", ")
                        );
                    }
                }
            }

            RecordAction::Show { record_id } => {
                let id = parse_record_id(&record_id)?;
                let Some(record) = journal.get_record(&id)? else {
                    anyhow::bail!("Record not found: {}", record_id);
                };
                println!("Record: {}", record.id);
                println!("  State: {}", record.state);
                println!("  Created: {}", format_timestamp(record.timestamp));
                println!("  Retries: {}", record.retry_count);
                println!("  Items ({}):", record.items.len());
                for item in &record.items {
                    println!(
                        "    {} {} {}",
                        item.state,
                        item.contained_type,
                        item.key.as_deref().unwrap_or("-")
                    );
                }
                if !record.server_records.is_empty() {
                    println!("  Server states:");
                    for sr in &record.server_records {
                        println!("    {} {}", sr.server_id, sr.state);
                    }
                }
            }

            RecordAction::SetState {
                record_id,
                state,
                server,
            } => {
                let id = parse_record_id(&record_id)?;
                let state = parse_state(&state)?;
                let location = match server {
                    Some(server) => StateLocation::for_server(&find_server(&journal, &server)?),
                    None => StateLocation::Record,
                };
                journal.set_record_state(&id, location, state)?;
                println!("Set {} to {}", id, state);
            }
        },

        Commands::Export {
            server,
            max,
            write,
            request_response,
        } => {
            let server = find_server(&journal, &server)?;
            let mut options = TransmissionOptions::new()
                .persist_locally(write)
                .request_response(request_response);
            if let Some(max) = max {
                options = options.max_records(max);
            }

            let outbox = config.transmission_dir.clone();
            let strategy = SyncStrategy::new(&journal, &journal, config);
            let Some(tx) =
                strategy.build_state_based_transmission(&journal, Some(&server), &options)?
            else {
                anyhow::bail!("No transmission built for {}", server.nickname);
            };

            print_transmission(&tx)?;
            if let (true, Some(dir)) = (write, outbox) {
                println!();
                println!("Wrote: {}", dir.join(&tx.file_name).display());
            }
        }

        Commands::ExportWindow { write } => {
            let outbox = config.transmission_dir.clone();
            let strategy = SyncStrategy::new(&journal, &journal, config);
            let tx = strategy.build_time_window_transmission(&journal, write)?;

            print_transmission(&tx)?;
            if let (true, Some(dir)) = (write, outbox) {
                println!();
                println!("Wrote: {}", dir.join(&tx.file_name).display());
            }
        }

        Commands::Notices => {
            let notices = journal.list_notices()?;
            if notices.is_empty() {
                println!("No failure notices.");
            } else {
                println!("Notices ({}):", notices.len());
                println!();
                for notice in notices {
                    println!(
                        "  {} {} -> {}: {}",
                        format_timestamp(notice.raised_at),
                        notice.record_id,
                        notice.server_nickname,
                        notice.reason
                    );
                }
            }
        }

        Commands::Inspect { file } => {
            let tx = Transmission::read_from(&file)
                .with_context(|| format!("Failed to read transmission {}", file.display()))?;
            print_transmission(&tx)?;
        }
    }

    Ok(())
}
