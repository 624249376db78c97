//! distonic command-line tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "distonic")]
#[command(about = "Watch git branches and run their build pipelines", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, env = "DISTONIC_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured repositories and build every new commit
    Serve {
        /// Path to the process configuration
        #[arg(long, env = "DISTONIC_CONFIG", default_value = "config.kdl")]
        config: PathBuf,
        /// Override the size of the worker pool
        #[arg(long, env = "DISTONIC_WORKERS")]
        workers: Option<usize>,
        /// Override the data directory
        #[arg(long, env = "DISTONIC_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Validate a pipeline definition against the built-in modules
    Validate {
        /// Path to the pipeline definition
        #[arg(default_value = "distonic.kdl")]
        path: PathBuf,
    },
    /// Run the pipeline of a local directory once
    Run {
        /// Directory holding the pipeline definition
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Pipeline definition file name
        #[arg(long, default_value = distonic_config::DEFAULT_PIPELINE_FILE)]
        file: String,
        /// Branch name exposed to the pipeline
        #[arg(long, default_value = "local")]
        branch: String,
        /// Commit id exposed to the pipeline
        #[arg(long, default_value = "0000000000000000000000000000000000000000")]
        commit: String,
        /// Run the jobs of each stage one after another
        #[arg(long)]
        sequential: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Serve {
            config,
            workers,
            data_dir,
        } => {
            commands::serve::serve(&config, workers, data_dir).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Run {
            dir,
            file,
            branch,
            commit,
            sequential,
        } => {
            commands::run::run_local(&dir, &file, &branch, &commit, sequential).await?;
        }
    }

    Ok(())
}
