// ABOUTME: CLI entry point for tsvio
// ABOUTME: Parses commands, opens the database and routes to the command handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tsvio::commands::{self, ImportTarget};
use tsvio::config::{load_settings, DEFAULT_CONNECTION};
use tsvio::transfer::SelectionOptions;

#[derive(Parser)]
#[command(name = "tsvio")]
#[command(
    about = "Export database tables to tab-separated fixture files and load them back",
    long_about = None
)]
struct Cli {
    /// Settings file (default: tsvio.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Connection name from the settings file, or a database URL
    #[arg(short, long, global = true, default_value = DEFAULT_CONNECTION)]
    connection: String,
    /// Directory holding the transfer files (overrides fixtures_dir)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,
    /// Fields to export instead of the table's columns (comma-separated)
    #[arg(long, global = true)]
    fields: Option<String>,
    /// Export only the primary key
    #[arg(long, global = true)]
    no_fields: bool,
    /// Column(s) to use as the primary key (comma-separated)
    #[arg(long, global = true)]
    primary_key: Option<String>,
    /// Table name to use instead of the one derived from the argument
    #[arg(long, global = true)]
    table: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write each table's rows to <path>/<table>.txt
    Export {
        #[arg(required = true)]
        tables: Vec<String>,
    },
    /// Replace each table's rows with the contents of <path>/<table>.txt
    Import {
        #[arg(required = true)]
        tables: Vec<String>,
    },
    /// Import every table that has a transfer file
    All,
    /// List the tables that can be transferred
    Tables,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    let fixtures_dir = cli.path.unwrap_or_else(|| settings.fixtures_dir.clone());
    let url = settings.resolve_connection(&cli.connection)?;
    let mut db = tsvio::open_database(&url).await?;

    let table_override = cli.table.as_deref();
    let report = match cli.command {
        Commands::Export { tables } => {
            let options = SelectionOptions {
                explicit_fields: cli.fields,
                no_fields: cli.no_fields,
                primary_key_override: cli.primary_key,
            };
            commands::export(&mut db, &tables, &fixtures_dir, &options, table_override).await?
        }
        Commands::Import { tables } => {
            let target = if tables.len() == 1 && tables[0] == "all" {
                ImportTarget::All
            } else {
                ImportTarget::Tables(tables)
            };
            commands::import(&mut db, target, &fixtures_dir, table_override).await?
        }
        Commands::All => {
            commands::import(&mut db, ImportTarget::All, &fixtures_dir, table_override).await?
        }
        Commands::Tables => {
            commands::tables(&mut db, &fixtures_dir).await?;
            return Ok(());
        }
    };

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
