//! Command line interface
//!
//! - `run`: execute a pipeline against the Docker daemon
//! - `check`: load and validate a pipeline, printing its stage listing
//! - `completions`: generate shell completions

pub mod check;
pub mod completions;
pub mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Pipeline file read when none is given
pub const DEFAULT_PIPELINE_FILE: &str = "docker-pipeline.yml";

/// CLI arguments for polka
#[derive(Parser, Debug)]
#[command(name = "polka")]
#[command(author, version, about = "Runs container pipelines described in YAML", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage of a pipeline in order
    Run {
        /// Pipeline file
        #[arg(short, long, default_value = DEFAULT_PIPELINE_FILE)]
        file: PathBuf,
        /// Runtime configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Log at debug level
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a pipeline without running it
    Check {
        /// Pipeline file
        #[arg(short, long, default_value = DEFAULT_PIPELINE_FILE)]
        file: PathBuf,
        /// Print the loaded pipeline as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse and execute CLI arguments
///
/// # Errors
///
/// Returns an error when the pipeline or configuration cannot be loaded or
/// the daemon cannot be reached. A failing stage is reported through the
/// exit code instead.
pub async fn run() -> Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            file,
            config,
            verbose,
        } => run::run_pipeline(&file, config.as_deref(), verbose).await,
        Command::Check { file, json } => {
            println!("{}", check::check_pipeline(&file, json)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Completions { shell, output } => {
            let completions = completions::generate_completions(shell)?;
            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                print!("{completions}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
