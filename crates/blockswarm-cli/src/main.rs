//! blockswarm CLI
//!
//! Runs a peer or the tracker, and splits files into blocks.

use anyhow::Context;
use blockswarm_core::PeerIdentity;
use blockswarm_node::{run_tracker, shutdown_on_signal, NodeConfig, PeerNode};
use blockswarm_storage::{split_file, BlockStore};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "blockswarm")]
#[command(version)]
#[command(about = "Peer-to-peer block distribution with rarest-first and tit-for-tat choking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "BLOCKSWARM_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a peer agent
    Peer {
        /// Peer id; the peer listens on port_base + id
        id: u16,

        /// Number of blocks in the file
        total_blocks: u32,

        /// Blocks this peer already holds
        #[arg(required = true, num_args = 1..)]
        blocks: Vec<u32>,
    },

    /// Run the tracker
    Tracker,

    /// Split a file into blocks
    Split {
        /// File to split
        file: PathBuf,

        /// Destination directory (defaults to the configured blocks dir)
        #[arg(long)]
        blocks_dir: Option<PathBuf>,

        /// Block size in bytes (defaults to the configured block size)
        #[arg(long)]
        block_size: Option<usize>,
    },
}

fn init_logging(verbose: bool, level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Peer {
            id,
            total_blocks,
            blocks,
        } => {
            let log_file = config.logging.file.then(|| config.log_path(id));
            init_logging(cli.verbose, &config.logging.level, log_file.as_deref())?;

            let identity = PeerIdentity::new(id, total_blocks, blocks).context("Invalid peer arguments")?;
            let node = PeerNode::bind(config, identity).await?;
            node.run(shutdown_on_signal()).await?;
        }

        Commands::Tracker => {
            init_logging(cli.verbose, &config.logging.level, None)?;
            run_tracker(&config.swarm, shutdown_on_signal()).await?;
        }

        Commands::Split {
            file,
            blocks_dir,
            block_size,
        } => {
            init_logging(cli.verbose, &config.logging.level, None)?;

            let dir = blocks_dir.unwrap_or(config.storage.blocks_dir);
            let block_size = block_size.unwrap_or(config.swarm.block_size);
            anyhow::ensure!(block_size > 0, "block size must be greater than zero");

            let store = BlockStore::open(&dir).await?;
            let total = split_file(&file, &store, block_size).await?;
            println!("{} blocks written to {}", total, dir.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_peer_requires_blocks() {
        assert!(Cli::try_parse_from(["blockswarm", "peer", "1", "8"]).is_err());

        let cli = Cli::try_parse_from(["blockswarm", "peer", "1", "8", "0", "3"]).unwrap();
        match cli.command {
            Commands::Peer {
                id,
                total_blocks,
                blocks,
            } => {
                assert_eq!(id, 1);
                assert_eq!(total_blocks, 8);
                assert_eq!(blocks, vec![0, 3]);
            }
            _ => panic!("expected peer command"),
        }
    }

    #[test]
    fn test_split_overrides() {
        let cli = Cli::try_parse_from(["blockswarm", "split", "in.bin", "--block-size", "128", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Split {
                block_size: Some(128),
                blocks_dir: None,
                ..
            }
        ));
    }
}
