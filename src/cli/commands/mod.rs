//! CLI parser and dispatch to command modules.

mod classify;
mod cleanup;
mod submit;
mod watch;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::region::Template;
use crate::work_queue::QueueName;

#[derive(Parser)]
#[command(name = "invoicepipe")]
#[command(about = "Scanned invoice extraction pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

fn parse_template(s: &str) -> Result<Template, String> {
    Template::from_str(s)
        .ok_or_else(|| format!("unknown template '{}' (janzour, safwa, massara, muasafat)", s))
}

fn parse_queue(s: &str) -> Result<QueueName, String> {
    QueueName::from_str(s).ok_or_else(|| format!("unknown queue '{}' (gpu, llm)", s))
}

#[derive(Subcommand)]
enum Commands {
    /// Queue documents (PDFs or page images) for extraction
    Submit {
        /// Files to submit; more than one creates a batch
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Document template
        #[arg(short, long, value_parser = parse_template)]
        template: Template,
        /// Process the jobs in this process and print their events
        #[arg(long)]
        wait: bool,
    },

    /// Consume stage messages from the queues
    Worker {
        /// Queues to consume (default: all)
        #[arg(short, long, value_parser = parse_queue)]
        queue: Vec<QueueName>,
        /// Exit once the queues are empty instead of waiting for more work
        #[arg(long)]
        drain: bool,
    },

    /// Print progress events as JSON lines
    Watch {
        /// Only show events for this batch, and stop when it completes
        #[arg(short, long)]
        batch: Option<String>,
    },

    /// Run the region classifier on one page image and save the crop
    Classify {
        /// Page image
        image: PathBuf,
        #[arg(short, long, value_parser = parse_template)]
        template: Template,
        /// Where to write the crop (default: next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete stale interim page directories
    Cleanup {
        /// Age threshold in hours (default: from config)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).await?;
    if let Some(path) = &config.source_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Submit {
            files,
            template,
            wait,
        } => submit::cmd_submit(&config, &files, template, wait).await,
        Commands::Worker { queue, drain } => worker::cmd_worker(&config, &queue, drain).await,
        Commands::Watch { batch } => watch::cmd_watch(&config, batch.as_deref()).await,
        Commands::Classify {
            image,
            template,
            output,
        } => classify::cmd_classify(&config, &image, template, output).await,
        Commands::Cleanup { ttl_hours } => cleanup::cmd_cleanup(&config, ttl_hours).await,
    }
}
