mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pyjudge-cli")]
#[command(about = "pyjudge CLI - Run Python submissions against test assertions locally", long_about = None)]
struct Cli {
    /// Path to a runner config file (defaults to config/runner.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission against a JSON file of tests
    Run {
        /// Python source file to test
        #[arg(short, long)]
        code: String,

        /// JSON file with the tests (array or {"tests": [...]})
        #[arg(short, long)]
        tests: String,

        /// Per-test timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print results as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check that the configured interpreter can run a test
    Doctor,

    /// Print the resolved configuration
    ShowConfig,

    /// Write a default configuration file
    Init {
        /// Destination path
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            code,
            tests,
            timeout_ms,
            json,
        } => {
            let config = commands::resolve_config(cli.config.as_deref(), timeout_ms)?;
            let all_passed = commands::run_submission(&code, &tests, &config, json).await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        Commands::Doctor => {
            let config = commands::resolve_config(cli.config.as_deref(), None)?;
            commands::doctor(&config).await?;
        }
        Commands::ShowConfig => {
            let config = commands::resolve_config(cli.config.as_deref(), None)?;
            commands::show_config(&config)?;
        }
        Commands::Init { path, force } => {
            commands::init_config(path.as_deref(), force)?;
        }
    }

    Ok(())
}
