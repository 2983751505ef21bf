//! critic-panel CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "critic-panel",
    version,
    about = "Persona panel of LLM evaluators"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every persona in a catalog against a model and collect the votes
    Run {
        /// Catalog TOML file (defaults to the config's catalog, then the built-in band panel)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Model to use, as "provider/model" or just "model"
        #[arg(long)]
        model: Option<String>,

        /// Generation temperature (overrides config)
        #[arg(long)]
        temperature: Option<f64>,

        /// Per-call timeout in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Output directory (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the report as JSON instead of tables
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a catalog TOML file
    Validate {
        /// Catalog TOML file (defaults to the built-in band panel)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Print the prompt one persona would receive
    Prompt {
        /// Catalog TOML file (defaults to the built-in band panel)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Persona id
        #[arg(long)]
        persona: String,
    },

    /// Create starter config and the band catalog
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,critic=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            catalog,
            model,
            temperature,
            timeout,
            output,
            json,
            config,
        } => {
            commands::run::execute(commands::run::RunArgs {
                catalog,
                model,
                temperature,
                timeout,
                output,
                json,
                config,
            })
            .await
        }
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Prompt { catalog, persona } => commands::prompt::execute(catalog, persona),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
