//! chunkyard command-line entry point.

mod commands;
mod config;
mod serve;

use std::path::PathBuf;

use anyhow::Context;
use chunkyard_transfer::TransferCoordinator;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunkyard")]
#[command(about = "Chunked file transfer against a local storage root")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        long,
        global = true,
        env = "CHUNKYARD_CONFIG",
        default_value = "chunkyard.toml"
    )]
    config: PathBuf,

    /// Storage root (overrides the configuration file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage one chunk read from a file
    Put {
        transfer_id: String,
        index: u64,
        file: PathBuf,
        /// Total number of chunks in the transfer
        #[arg(long)]
        total: Option<u64>,
        /// SHA-256 hex digest of the chunk
        #[arg(long)]
        checksum: Option<String>,
    },
    /// Split a file into chunks, stage them and finalize
    Upload {
        file: PathBuf,
        target: String,
        /// Transfer id (random when omitted)
        #[arg(long)]
        transfer_id: Option<String>,
        /// Chunk size in bytes (configured default when omitted)
        #[arg(long)]
        chunk_size: Option<u64>,
    },
    /// Merge the staged chunks of a transfer into an artifact
    Finalize {
        transfer_id: String,
        target: String,
        count: u64,
        /// Expected SHA-256 hex digest of the artifact
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Download an artifact range by range
    Download {
        target: String,
        out: PathBuf,
        /// Range size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
    },
    /// Show staged chunks of a transfer
    Status {
        transfer_id: String,
        /// Expected chunk count, to list missing indices
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Discard a transfer's staged chunks
    Abort { transfer_id: String },
    /// Answer JSON protocol messages read line by line from stdin
    Serve,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(&cli.config)?.with_root_override(cli.root);
    let coordinator = TransferCoordinator::open(config.transfer)
        .context("failed to open storage root")?;

    match cli.command {
        Commands::Put {
            transfer_id,
            index,
            file,
            total,
            checksum,
        } => {
            let bytes = commands::put(
                &coordinator,
                &transfer_id,
                index,
                &file,
                total,
                checksum.as_deref(),
            )?;
            println!("stored chunk {index} of {transfer_id} ({bytes} bytes)");
        }
        Commands::Upload {
            file,
            target,
            transfer_id,
            chunk_size,
        } => {
            let transfer_id = transfer_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let chunk_size = chunk_size.unwrap_or(coordinator.config().default_chunk_size);
            let artifact = commands::upload(&coordinator, &file, &target, &transfer_id, chunk_size)?;
            println!("{} {} {}", artifact.target_name, artifact.size, artifact.sha256);
        }
        Commands::Finalize {
            transfer_id,
            target,
            count,
            sha256,
        } => {
            let artifact = match sha256 {
                Some(sum) => coordinator.finalize_verified(&transfer_id, &target, count, &sum)?,
                None => coordinator.finalize(&transfer_id, &target, count)?,
            };
            println!("{} {} {}", artifact.target_name, artifact.size, artifact.sha256);
        }
        Commands::Download {
            target,
            out,
            chunk_size,
        } => {
            let (bytes, sha256) = commands::download(&coordinator, &target, &out, chunk_size)?;
            println!("{} {bytes} {sha256}", out.display());
        }
        Commands::Status {
            transfer_id,
            expected,
        } => {
            let status = commands::status(&coordinator, &transfer_id, expected)?;
            println!("transfer:     {}", status.transfer_id);
            println!("received:     {:?}", status.received);
            if expected.is_some() {
                println!("missing:      {:?}", status.missing);
            }
            println!("staged bytes: {}", status.staged_bytes);
        }
        Commands::Abort { transfer_id } => {
            commands::abort(&coordinator, &transfer_id)?;
            println!("aborted {transfer_id}");
        }
        Commands::Serve => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve::run(coordinator))?;
        }
    }

    Ok(())
}
