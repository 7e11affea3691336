//! Sheetload CLI - Import spreadsheets into the record store
//!
//! # Main Commands
//!
//! ```bash
//! sheetload serve                              # Start HTTP server (port 3000)
//! sheetload import users.csv -c users.json     # Import a spreadsheet
//! sheetload records users                      # Show stored records
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! sheetload parse users.csv        # Just parse the sheet to JSON rows
//! sheetload check users.json       # Validate an import definition
//! sheetload operations             # Show available field operations
//! ```

use clap::{Parser, Subcommand};
use sheetload::{
    operations_description, read_sheet, CollectingSink, ColumnKeys, Disks, ImportConfig,
    ImportOutcome, ModelStore, RecordStore, Settings, Severity,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetload")]
#[command(about = "Bulk import spreadsheet rows into a transactional record store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a spreadsheet using a JSON import definition
    Import {
        /// Spreadsheet (CSV, TSV, XLSX, XLS, ODS)
        input: PathBuf,

        /// Import definition (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Read the spreadsheet from this disk instead of the file system
        #[arg(short, long)]
        disk: Option<String>,

        /// Store directory (default: $SHEETLOAD_STORE_DIR)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Validate an import definition without importing
    Check {
        /// Import definition (JSON)
        config: PathBuf,
    },

    /// Parse a spreadsheet and output its rows as JSON
    Parse {
        /// Input spreadsheet
        input: PathBuf,

        /// Key cells by the header row instead of the column index
        #[arg(long)]
        heading: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the stored records of a model
    Records {
        /// Model name
        model: String,

        /// Store directory (default: $SHEETLOAD_STORE_DIR)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Show available field operations
    Operations,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $SHEETLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Import { input, config, disk, store } => {
            cmd_import(&settings, &input, &config, disk.as_deref(), store)
        }

        Commands::Check { config } => cmd_check(&config),

        Commands::Parse { input, heading, output } => cmd_parse(&input, heading, output.as_deref()),

        Commands::Records { model, store } => cmd_records(&settings, &model, store),

        Commands::Operations => cmd_operations(),

        Commands::Serve { port } => cmd_serve(settings, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_import(
    settings: &Settings,
    input: &Path,
    config_path: &Path,
    disk: Option<&str>,
    store_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", input.display());

    let config = ImportConfig::load(config_path)?;
    eprintln!("   Model: {}", config.model);

    // Without a disk the file is read from its own directory
    let import = match disk {
        Some(disk) => config
            .into_import()?
            .storage(settings.disks())
            .disk(disk)
            .spreadsheet(input.to_string_lossy()),
        None => {
            let parent = input.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = input
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| format!("Invalid file name: {}", input.display()))?;
            config
                .into_import()?
                .storage(Disks::new(parent))
                .disk(sheetload::LOCAL_DISK)
                .spreadsheet(file_name)
        }
    };

    let mut store = RecordStore::open(store_dir.unwrap_or_else(|| settings.store_dir.clone()))?;
    let sink = CollectingSink::new();

    let outcome = import.execute(&mut store, &sink)?;

    eprintln!();
    for notification in sink.notifications() {
        let icon = match notification.severity {
            Severity::Success => "✅",
            Severity::Danger => "❌",
        };
        eprintln!("{} {}", icon, notification.title);
        eprintln!("   {}", notification.body);
    }

    match outcome {
        ImportOutcome::Completed(summary) => {
            eprintln!(
                "\n📊 Results: {} processed, {} created, {} updated, {} skipped",
                summary.processed, summary.created, summary.updated, summary.skipped
            );
            eprintln!("\n✨ Done!");
            Ok(())
        }
        ImportOutcome::Cancelled => {
            eprintln!("⚠️  Import cancelled by a batch hook");
            std::process::exit(1);
        }
        ImportOutcome::Rejected { .. } | ImportOutcome::RolledBack(_) => std::process::exit(1),
    }
}

fn cmd_check(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Checking: {}", config_path.display());

    let config = ImportConfig::load(config_path)?;
    config.check()?;

    eprintln!("   Model: {}", config.model);
    eprintln!("   Fields: {}", config.field_tree()?.flatten().len());
    eprintln!("   Descriptors: {}", config.descriptors.len());
    eprintln!("✅ Import definition is valid");
    Ok(())
}

fn cmd_parse(input: &Path, heading: bool, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let keys = if heading { ColumnKeys::Heading } else { ColumnKeys::Index };
    let sheet = read_sheet(input, keys)?;

    if let Some(ref encoding) = sheet.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    if let Some(delimiter) = sheet.delimiter {
        eprintln!("   Delimiter: '{}'", format_delimiter(delimiter));
    }
    if let Some(ref headers) = sheet.headers {
        eprintln!("   Columns: {}", headers.join(", "));
    }
    eprintln!("✅ Parsed {} rows", sheet.rows.len());

    let json = serde_json::to_string_pretty(&sheet.rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_records(settings: &Settings, model: &str, store_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(store_dir.unwrap_or_else(|| settings.store_dir.clone()))?;
    let records = store.all(model);

    eprintln!("📦 {}: {} records", model, records.len());
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn cmd_operations() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", operations_description());
    Ok(())
}

async fn cmd_serve(mut settings: Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        settings.port = port;
    }
    sheetload::server::start_server(settings).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
