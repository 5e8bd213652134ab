//! Command line interface: find BIDS datasets and index them into Parquet.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bidsindex::config::IndexerConfig;
use bidsindex::dataset::{self, FindOptions};
use bidsindex::error::Result;
use bidsindex::index::{self, IndexOptions};
use bidsindex::schema;
use bidsindex::table;

#[derive(Parser, Debug)]
#[command(name = "bidsindex", version, about = "Find and index BIDS datasets.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase logging. -v enables info, -vv debug.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Path to a configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index BIDS dataset(s) into a Parquet file.
    Index {
        /// Dataset root directories to index.
        #[arg(required = true)]
        root: Vec<PathBuf>,
        /// Path of the output Parquet file.
        #[arg(short, long)]
        output: PathBuf,
        /// Subject names or glob patterns to include in the index.
        #[arg(long)]
        subjects: Vec<String>,
        /// Number of worker threads. 0 runs in the main thread.
        #[arg(short = 'j', long)]
        workers: Option<usize>,
    },
    /// Find BIDS dataset roots under a directory.
    Find {
        /// Root directory to search.
        root: PathBuf,
        /// Directory names or glob patterns to exclude from the search.
        #[arg(long)]
        exclude: Vec<String>,
        /// Follow symbolic links.
        #[arg(short = 'L', long)]
        follow_symlinks: bool,
        /// Maximum search depth.
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = IndexerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Index {
            root,
            output,
            subjects,
            workers,
        } => {
            let schema = schema::active();
            let options = IndexOptions {
                include_subjects: subjects,
                workers: workers.unwrap_or(config.index.workers),
            };
            let batches = index::index_all(&root, &schema, &config, &options)?;
            table::write_parquet(&output, Arc::new(schema.columnar_schema()), batches)?;
            Ok(())
        }
        Commands::Find {
            root,
            exclude,
            follow_symlinks,
            max_depth,
        } => {
            let options = FindOptions {
                exclude,
                follow_symlinks,
                max_depth,
            };
            for dataset in dataset::find_datasets(&root, &config.policy, &options)? {
                println!("{}", dataset.display());
            }
            Ok(())
        }
    }
}
