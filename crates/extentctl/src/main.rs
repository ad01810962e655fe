//! extentctl - store and fetch files on an extent server
//!
//! Subcommands:
//! - `extentctl write <file>` - store a file, print its recipe
//! - `extentctl read <recipe|->` - fetch a file from its recipe
//! - `extentctl poll <hash>` - check whether the server holds an extent

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extentconf::{normalize_directive, ExtentConfig, LogLevel};
use extentctl::commands;
use extentproto::ExtentSession;

#[derive(Parser)]
#[command(name = "extentctl")]
#[command(about = "Command-line client for the extentfs extent server")]
#[command(version)]
struct Cli {
    /// Extent server host [default: localhost]
    #[arg(long, global = true)]
    host: Option<String>,

    /// Extent server port [default: 8989]
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Maximum extent size when writing [default: 4096]
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Config file to use instead of ./extentfs.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging verbosity, off through trace (logs go to stderr)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its recipe (a JSON array of hashes)
    Write {
        /// File to store
        file: PathBuf,
    },

    /// Fetch a file from its recipe
    Read {
        /// Recipe file, or - for stdin
        recipe: String,

        /// Write content here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether the server holds an extent
    Poll {
        /// Extent hash (64 hex characters)
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ExtentConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(host) = cli.host {
        config.client.server_host = host;
    }
    if let Some(port) = cli.port {
        config.client.server_port = port;
    }
    if let Some(size) = cli.chunk_size {
        config.client.chunk_size = size;
    }
    let log_level = cli
        .log_level
        .map(|l| l.as_directive().to_string())
        .unwrap_or_else(|| normalize_directive(&config.telemetry.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&log_level)
                .with_context(|| format!("Invalid log level: {log_level}"))?,
        )
        .with_writer(std::io::stderr)
        .init();

    // Resolve local inputs before touching the network.
    let recipe = match &cli.command {
        Commands::Write { file } if !file.is_file() => {
            anyhow::bail!("No such file: {}", file.display());
        }
        Commands::Read { recipe, .. } => Some(commands::load_recipe(recipe).await?),
        _ => None,
    };

    let addr = config.client.server_addr();
    let session = ExtentSession::connect(addr.as_str())
        .await
        .with_context(|| format!("Failed to connect to extent server at {addr}"))?
        .with_chunk_size(config.client.chunk_size);

    match cli.command {
        Commands::Write { file } => {
            let recipe = commands::write(&session, &file).await?;
            println!("{}", serde_json::to_string(&recipe)?);
        }
        Commands::Read { output, .. } => {
            let recipe = recipe.unwrap_or_default();
            let bytes = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    commands::read(&session, &recipe, &mut file).await?
                }
                None => commands::read(&session, &recipe, &mut tokio::io::stdout()).await?,
            };
            tracing::info!(bytes, extents = recipe.len(), "read complete");
        }
        Commands::Poll { hash } => {
            let present = commands::poll(&session, &hash).await?;
            println!("{}", if present { "present" } else { "absent" });
        }
    }

    Ok(())
}
