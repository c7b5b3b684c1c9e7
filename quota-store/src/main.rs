//! CLI for driving a quota-tracked file store
//!
//! # Usage
//!
//! ```bash
//! # Run a command script against a fresh store
//! quota-store run session.txt
//!
//! # Run the built-in capacity bookkeeping scenarios
//! quota-store check
//!
//! # Use a configuration file
//! quota-store --config quota-store.toml run session.txt
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quota_store::config::LoggingConfig;
use quota_store::script::{ScriptRunner, SCENARIOS};
use quota_store::{QuotaFileStore, StoreConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quota-store")]
#[command(about = "Quota-tracked file store", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script against a fresh store
    Run {
        /// Script file, one command per line
        script: PathBuf,
    },
    /// Run the built-in capacity bookkeeping scenarios
    Check,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quota_store={}", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StoreConfig::default(),
    };

    init_logging(&config.logging);
    info!("Starting quota-store v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { script } => {
            let source = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("reading {}", script.display()))?;

            let store = QuotaFileStore::with_config(&config)?;
            let mut runner = ScriptRunner::new(store);
            let output = runner
                .run(&source)
                .await
                .with_context(|| format!("running {}", script.display()))?;

            for line in output {
                println!("{}", line);
            }
        }
        Commands::Check => {
            let mut failed = 0;
            for scenario in SCENARIOS {
                match scenario.run().await {
                    Ok(_) => println!("✓ {}", scenario.name),
                    Err(e) => {
                        error!("Scenario '{}' failed: {}", scenario.name, e);
                        println!("✗ {}: {}", scenario.name, e);
                        failed += 1;
                    }
                }
            }

            println!(
                "{} passed, {} failed",
                SCENARIOS.len() - failed,
                failed
            );
            if failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
