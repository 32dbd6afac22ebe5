//! RepoGenome CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "repogenome")]
#[command(about = "Repository intelligence engine: scan a codebase into a queryable genome", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the repository and persist the genome
    Scan {
        /// Reuse the existing genome and re-analyze changed files only
        #[arg(short, long)]
        incremental: bool,
    },
    /// Serve the genome over the stdio protocol
    Serve,
    /// Write a projection of the genome
    Export {
        /// json | graphml | dot | csv | cypher | plantuml
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output path (defaults next to the repo root)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check the persisted genome against every invariant
    Validate,
    /// Run a one-shot query (predicate as JSON)
    Query {
        /// Predicate, e.g. '{"type": "function", "language": "Python"}'
        predicate: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    // stdout carries the wire protocol when serving; logs stay on stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "repogenome={log_level},genome_core={log_level},genome_analyzers={log_level},genome_subsystems={log_level},genome_engine={log_level},genome_query={log_level},genome_server={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("{err}");
            if let Some(hint) = err.hint() {
                tracing::error!("hint: {hint}");
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> genome_core::Result<()> {
    match cli.command {
        Commands::Scan { incremental } => commands::scan(&cli.root, incremental),
        Commands::Serve => commands::serve(&cli.root).await,
        Commands::Export { format, out } => commands::export(&cli.root, &format, out.as_deref()),
        Commands::Validate => commands::validate(&cli.root),
        Commands::Query { predicate } => commands::query(&cli.root, &predicate),
        Commands::Version => {
            println!("repogenome v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
