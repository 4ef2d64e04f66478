use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "routelens")]
#[command(about = "Static execution-flow maps for web-service route handlers")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze route handlers and emit an execution-flow report
    Analyze {
        /// Routes manifest (JSON) produced by the route discovery step
        #[arg(short, long)]
        routes: PathBuf,

        /// Source directory to analyze (defaults to configured source dirs)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output file for the report (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the report JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Dump the analyzed flow info for a single function
    Inspect {
        /// Function name to look up
        function: String,

        /// Source directory to analyze (defaults to configured source dirs)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Analyze { routes, source, output, pretty } => {
                engine.analyze(routes, source, output, pretty).await
            }
            Commands::Inspect { function, source } => {
                engine.inspect(&function, source).await
            }
            Commands::Init { path } => {
                engine.init(path).await
            }
        }
    }
}
