//! Grove CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Dependency graph of a source tree, enriched in the background", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository and write the snapshot
    Index,
    /// Run every enrichment phase and exit
    Enrich,
    /// Serve queries and live enrichment events
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7890")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Do not start enrichment on startup
        #[arg(long)]
        no_enrich: bool,
    },
    /// Query the graph
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },
    /// Clear the cache
    Clear,
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Print one file's capsule
    Capsule { path: String },
    /// Search symbol names
    Search { term: String },
    /// Files within a few import hops of a file
    Neighbors {
        path: String,
        #[arg(long, default_value = "1")]
        radius: usize,
        #[arg(long, default_value = "20")]
        cap: usize,
        /// Only follow imports outward
        #[arg(long, conflicts_with = "dependents")]
        dependencies: bool,
        /// Only follow importers inward
        #[arg(long)]
        dependents: bool,
    },
    /// Aggregate graph statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = dotenvy::from_path(cli.root.join(".env")) {
        tracing::debug!("No workspace .env loaded: {}", e);
    }

    tracing::debug!("Grove v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root),
        Commands::Enrich => commands::enrich(cli.root).await,
        Commands::Serve { port, host, no_enrich } => commands::serve(cli.root, host, port, !no_enrich).await,
        Commands::Query { query } => match query {
            QueryCommand::Capsule { path } => commands::query_capsule(cli.root, &path),
            QueryCommand::Search { term } => commands::query_search(cli.root, &term),
            QueryCommand::Neighbors { path, radius, cap, dependencies, dependents } => {
                let query = grove_core::NeighborhoodQuery {
                    include_dependencies: !dependents,
                    include_dependents: !dependencies,
                    ..grove_core::NeighborhoodQuery::new(path, radius, cap)
                };
                commands::query_neighbors(cli.root, &query)
            }
            QueryCommand::Stats => commands::query_stats(cli.root),
        },
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("Grove v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
