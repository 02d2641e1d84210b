//! Stepwise CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `run`: Start a new run towards a goal
//! - `resume`: Continue a paused or failed run, optionally answering feedback
//! - `show`: Print a persisted run
//! - `list`: List persisted runs

use clap::{Parser, Subcommand};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise: autonomous agents you can pause and resume",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Start a new run
    Run {
        /// The goal for the agent
        prompt: String,

        /// Label for the run (defaults to `agent.name` from the config)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Continue a persisted run
    Resume {
        agent_id: String,

        /// Answer the run's pending feedback request
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Show a persisted run
    Show {
        agent_id: String,

        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },

    /// List persisted runs, most recent first
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Init => commands::init::run()?,
        Commands::Run { prompt, name } => commands::run::run(prompt, name).await?,
        Commands::Resume { agent_id, feedback } => commands::resume::run(agent_id, feedback).await?,
        Commands::Show { agent_id, json } => commands::show::run(agent_id, json).await?,
        Commands::List => commands::list::run().await?,
    }

    Ok(())
}
