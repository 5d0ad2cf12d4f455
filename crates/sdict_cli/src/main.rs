//! SimpleDict CLI
//!
//! Command-line client for SimpleDict dictionary and kanban servers.
//!
//! # Commands
//!
//! - `fetch` - Download or revalidate the dictionary
//! - `get` / `set` / `del` - Read and modify single entries
//! - `search` / `latest` - Browse the dictionary
//! - `kanban-get` / `check-update` / `download` - Kanban server operations

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use sdict_engine::ClientConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SimpleDict command-line client.
#[derive(Parser)]
#[command(name = "sdict")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Server host
    #[arg(global = true, long)]
    host: Option<String>,

    /// Server port
    #[arg(global = true, long)]
    port: Option<u16>,

    /// Query password
    #[arg(global = true, long)]
    password: Option<String>,

    /// Mutation password
    #[arg(global = true, long)]
    set_password: Option<String>,

    /// Directory for the dictionary snapshot cache
    #[arg(global = true, long)]
    cache_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the dictionary, or reuse the cache if unchanged
    Fetch {
        /// Skip the cache and always download
        #[arg(short, long)]
        force: bool,
    },

    /// Print the value of a key
    Get {
        /// Key to look up
        key: String,
    },

    /// Set a key to a value
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
    },

    /// Delete a key
    Del {
        /// Key to delete
        key: String,
    },

    /// Find entries whose key or value contains a text
    Search {
        /// Text to look for, case-insensitive
        text: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List the most recently added keys
    Latest {
        /// Maximum number of keys to list
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print the kanban message for a version
    KanbanGet {
        /// Version number
        version: u32,
    },

    /// Check whether a newer version is available
    CheckUpdate {
        /// Currently installed version
        current_version: u32,
    },

    /// Download the kanban package and verify its MD5
    Download {
        /// Expected MD5 as hex
        #[arg(long)]
        md5: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Fetch { force } => commands::dict::fetch(&config, force)?,
        Commands::Get { key } => commands::dict::get(&config, &key)?,
        Commands::Set { key, value } => commands::dict::set(&config, &key, &value)?,
        Commands::Del { key } => commands::dict::del(&config, &key)?,
        Commands::Search { text, format } => commands::dict::search(&config, &text, format)?,
        Commands::Latest { limit, format } => commands::dict::latest(&config, limit, format)?,
        Commands::KanbanGet { version } => commands::kanban::get(&config, version),
        Commands::CheckUpdate { current_version } => {
            commands::kanban::check_update(&config, current_version);
        }
        Commands::Download { md5, out } => commands::kanban::download(&config, &md5, &out)?,
        Commands::Version => {
            println!("SimpleDict CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Reads the config file, if any, and applies command-line overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
            ClientConfig::from_json(&json)?
        }
        None => ClientConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    if let Some(password) = &cli.set_password {
        config.set_password = Some(password.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}
