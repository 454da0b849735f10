//! lancedb-native CLI
//!
//! Provisioning and smoke-test commands for the native engine.
//!
//! # Usage
//!
//! ```bash
//! # Download (or build) the engine for this platform into the cache
//! lancedb-native fetch-binaries
//!
//! # Show where the engine is expected
//! lancedb-native platform
//!
//! # List the tables of a database
//! lancedb-native tables --uri /data/lancedb
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lancedb_native::{config, Connection, Engine, NativeConfig};
use lancedb_native_fetch::{ensure_binaries_exist, Platform};

#[derive(Parser)]
#[command(name = "lancedb-native")]
#[command(about = "Provision and exercise the native LanceDB engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download or build the native library for this platform
    FetchBinaries {
        /// Directory receiving lib/ and include/ (default: user cache)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Print the platform directory and expected library file
    Platform,

    /// Connect to a database and list its tables
    Tables {
        /// Database URI (local path or object store URL)
        #[arg(long)]
        uri: String,

        /// Shared library to load instead of the configured one
        #[arg(long)]
        library: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::FetchBinaries { root } => {
            let root = match root {
                Some(root) => root,
                None => config::default_root().context("no cache directory for this user")?,
            };
            tracing::info!("Provisioning native binaries into {:?}", root);
            ensure_binaries_exist(&root)?;
            let platform = Platform::current();
            if let Some(path) = platform.library_path(&root) {
                println!("{}", path.display());
            }
        }

        Commands::Platform => {
            let platform = Platform::current();
            println!("platform: {platform}");
            match (platform.archive_file_name(), platform.library_file_name()) {
                (Some(archive), Some(library)) => {
                    println!("archive:  {archive}");
                    println!("library:  {library}");
                }
                _ => println!("library:  (not published for this platform)"),
            }
            match NativeConfig::from_env().library_path() {
                Ok(path) => println!("resolved: {}", path.display()),
                Err(e) => println!("resolved: {e}"),
            }
        }

        Commands::Tables { uri, library } => {
            let engine = match library {
                Some(path) => Engine::load(&path)?,
                None => Engine::global()?,
            };
            let connection = Connection::connect_with(engine, &uri, None)
                .with_context(|| format!("connecting to {uri}"))?;
            let names = connection.table_names()?;
            tracing::info!("{} tables at {}", names.len(), uri);
            for name in names {
                println!("{name}");
            }
            connection.close()?;
        }
    }

    Ok(())
}
