//! Command-line interface for `GeoCatalog`, which loads imagery item metadata
//! from object storage into PostGIS catalog tables.
//!
//! This binary is a thin façade over the [`geocatalog_core`] library: it parses
//! arguments, configures logging, and delegates to command handlers.
//!
//! # Available Commands
//!
//! - `load` - Reload every collection named in a catalog configuration
//! - `resolvers` - List the metadata resolvers and the file names they recognize
//! - `tables` - List the tables of a schema with their row counts
//! - `vacuum` - Run `VACUUM ANALYZE` over the tables of a schema

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geocatalog_core::config::{self, CatalogConfig};
use geocatalog_core::database::DatabaseGateway;
use geocatalog_core::error::CatalogError;
use geocatalog_core::operations;
use geocatalog_core::resolvers::get_resolvers;

#[derive(Parser)]
#[command(
    name = "geocatalog",
    version,
    about = "Load imagery metadata from object storage into PostGIS",
    long_about = "GeoCatalog discovers imagery items in cloud buckets, resolves their STAC \
                  metadata and reloads PostGIS catalog tables from them."
)]
/// Command-line arguments and options for the `GeoCatalog` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `GeoCatalog` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Reloads every collection in a catalog configuration.
    ///
    /// Each collection's table is dropped, recreated and filled with the
    /// items discovered in its sources. A failing collection does not stop
    /// the others.
    Load {
        /// Path to the catalog configuration (YAML).
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Lists the metadata resolvers and the file name tokens they recognize.
    Resolvers,

    /// Lists the tables of a schema with their row counts.
    Tables {
        /// Path to the catalog configuration (YAML) naming the server.
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Schema to list.
        #[arg(short, long)]
        schema: String,

        /// Only list tables whose name matches this regular expression.
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Runs `VACUUM ANALYZE` over the tables of a schema.
    ///
    /// Stops at the first table that fails.
    Vacuum {
        /// Path to the catalog configuration (YAML) naming the server.
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Schema to vacuum.
        #[arg(short, long)]
        schema: String,

        /// Only vacuum tables whose name contains this text.
        #[arg(short, long)]
        pattern: Option<String>,
    },
}

/// Entry point for the `GeoCatalog` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Load { config } => {
            info!("Loading catalog from {}", config.display());
            handle_load(&config)?;
        },
        Commands::Resolvers => {
            handle_resolvers();
        },
        Commands::Tables {
            config,
            schema,
            pattern,
        } => {
            handle_tables(&config, &schema, pattern.as_deref())?;
        },
        Commands::Vacuum {
            config,
            schema,
            pattern,
        } => {
            handle_vacuum(&config, &schema, pattern.as_deref())?;
        },
    }

    Ok(())
}

/// Converts a library error into a CLI error carrying its user message and,
/// when there is one, the recovery suggestion.
fn describe(err: CatalogError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(suggestion) => anyhow!("{}\n  hint: {suggestion}", err.user_message()),
        None => anyhow!(err.user_message()),
    }
}

fn read_config(path: &Path) -> Result<CatalogConfig> {
    CatalogConfig::load(path).map_err(|err| describe(err.into()))
}

fn handle_load(path: &Path) -> Result<()> {
    let config = read_config(path)?;
    let local_dir = config::config_dir(path);

    let reports = operations::load_catalog(&config, Some(&local_dir));
    display::display_reports(&reports);

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        return Err(anyhow!(
            "{failed} of {} collection(s) failed to load",
            reports.len()
        ));
    }
    info!("Catalog load complete.");
    Ok(())
}

fn handle_resolvers() {
    display::display_resolvers(&get_resolvers());
}

fn handle_tables(path: &Path, schema: &str, pattern: Option<&str>) -> Result<()> {
    let config = read_config(path)?;
    let gateway = DatabaseGateway::new(config.server.descriptor());

    let tables = gateway.list_tables(schema, pattern).map_err(describe)?;
    let counts = tables
        .iter()
        .map(|table| gateway.record_count(schema, table).map_err(describe))
        .collect::<Result<Vec<_>>>()?;

    display::display_tables(schema, &tables, &counts);
    Ok(())
}

fn handle_vacuum(path: &Path, schema: &str, pattern: Option<&str>) -> Result<()> {
    let config = read_config(path)?;
    let gateway = DatabaseGateway::new(config.server.descriptor());

    let vacuumed = gateway
        .vacuum_all_tables(schema, pattern)
        .map_err(describe)?;
    println!("Vacuumed {vacuumed} table(s) in {schema}");
    Ok(())
}
