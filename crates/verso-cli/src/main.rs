//! Verso CLI - build source distributions for pyproject-based packages

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod build;
mod logging;

#[derive(Parser)]
#[command(name = "verso")]
#[command(version)]
#[command(about = "Build legacy-compatible source distributions", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a source distribution (.tar.gz)
    Build {
        /// Project root containing pyproject.toml
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Output directory (defaults to <path>/dist)
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },

    /// Print the requirement strings of the main dependencies
    Requirements {
        /// Project root containing pyproject.toml
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Print the python classifiers derived from the python constraint
    Classifiers {
        /// Project root containing pyproject.toml
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Build { path, target_dir } => {
            let options = build::BuildOptions { path, target_dir };
            let target = build::build_package(&options)?;
            println!("{}", target.display());
        }

        Commands::Requirements { path } => {
            for requirement in build::requirements(&path)? {
                println!("{requirement}");
            }
        }

        Commands::Classifiers { path } => {
            for classifier in build::classifiers(&path)? {
                println!("{classifier}");
            }
        }
    }

    Ok(())
}
