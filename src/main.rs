//! BlockSync CLI - block-level differential file synchronization
//!
//! One binary, two roles: the driver (default) and the destination-side
//! agent (`blocksync agent`), which is what the driver spawns on the far end
//! of the transport.

use blocksync::config::{CliArgs, Commands, TransferConfig};
use blocksync::error::Result;
use blocksync::progress::ProgressReporter;
use blocksync::protocol::{agent, transfer};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage problems (including --help/--version) exit through here
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }
}

/// Initialize tracing on stderr; stdout belongs to the protocol in agent
/// mode
fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: CliArgs) -> Result<()> {
    // Agent role: everything arrives on the wire
    if let Some(Commands::Agent) = args.command {
        return agent::run();
    }

    // Driver role needs both positionals
    if args.source.is_none() || args.destination.is_none() {
        eprintln!("Usage: blocksync SRC [HOST:]DEST [BLOCKSIZE] [HASH]");
        eprintln!("       blocksync --help for more information");
        std::process::exit(1);
    }

    let config = TransferConfig::from_cli(&args).map_err(blocksync::BlockSyncError::Config)?;

    if args.verbose > 0 {
        print_config(&config);
    }

    let progress = if args.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };

    let stats = transfer(&config, &progress)?;

    if !args.quiet {
        eprintln!("{}", stats.summary_line());
    }

    Ok(())
}

fn print_config(config: &TransferConfig) {
    eprintln!("=== Configuration ===");
    eprintln!("Source:      {:?}", config.source);
    eprintln!("Destination: {}:{}", config.host, config.dest_path);
    eprintln!(
        "Block size:  {}",
        humansize::format_size(config.block_size, humansize::BINARY)
    );
    eprintln!("Hash:        {}", config.algorithm);
    eprintln!();
}
