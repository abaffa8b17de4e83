//! Configuration settings for BlockSync
//!
//! Defines the CLI surface, defaults, and the runtime configuration derived
//! from it.

use crate::hash::HashAlgorithm;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default block size: 4 MiB
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Default hash algorithm identifier
pub const DEFAULT_HASH: &str = "sha3_512";

/// Host value that selects a direct local child instead of ssh
pub const LOCAL_HOST: &str = "localhost";

/// BlockSync - block-level differential file synchronization
#[derive(Parser, Debug, Clone)]
#[command(name = "blocksync")]
#[command(author = "BlockSync Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sync a large file to a remote host, sending only changed blocks")]
#[command(long_about = r#"
BlockSync updates a copy of a large, mostly-stable file (a VM disk image,
a database snapshot) on a remote host, transferring only the blocks whose
contents differ. The remote side offers one fingerprint per fixed-size
block; the local side replies with the byte ranges that disagree, then both
sides verify a whole-file cryptographic digest.

The remote agent is this same binary invoked with the `agent` subcommand,
reachable through ssh. The destination must already be at least as large as
the source (or absent, in which case a sparse file is created).

Examples:
  blocksync disk.img backup:/srv/disk.img           # sync over ssh
  blocksync disk.img /mnt/mirror/disk.img           # local copy
  blocksync disk.img host:/srv/disk.img 1M blake3   # 1 MiB blocks, BLAKE3
"#)]
pub struct CliArgs {
    /// Source file (local, regular file)
    #[arg(value_name = "SRC")]
    pub source: Option<PathBuf>,

    /// Destination: [HOST:]PATH (no host means localhost)
    #[arg(value_name = "DEST")]
    pub destination: Option<String>,

    /// Block size (e.g. 4M, 64K, plain bytes)
    #[arg(value_name = "BLOCKSIZE")]
    pub block_size: Option<String>,

    /// Hash algorithm (sha3_512, sha3_256, sha512, sha256, blake3)
    #[arg(value_name = "HASH")]
    pub hash: Option<String>,

    /// Show a progress bar during the patch phase
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Quiet mode (suppress the summary line)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Program name used to start the agent on the remote host
    #[arg(long, default_value = "blocksync", value_name = "PROGRAM")]
    pub remote_program: String,

    /// ssh client used to reach remote hosts
    #[arg(long, default_value = "ssh", value_name = "PROGRAM")]
    pub ssh_program: String,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run as the destination-side agent on stdin/stdout (spawned via ssh)
    #[command(name = "agent")]
    Agent,
}

/// Runtime configuration for one transfer, derived from CLI args
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Local source file
    pub source: PathBuf,
    /// Destination host (`localhost` for a direct child)
    pub host: String,
    /// Destination path on the agent side
    pub dest_path: String,
    /// Block size in bytes (always > 0)
    pub block_size: u64,
    /// Resolved hash algorithm
    pub algorithm: HashAlgorithm,
    /// Program name for the remote agent invocation
    pub remote_program: String,
    /// ssh client program
    pub ssh_program: String,
}

impl TransferConfig {
    /// Build a transfer configuration from parsed CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        let source = args
            .source
            .clone()
            .ok_or_else(|| "missing source file".to_string())?;
        let destination = args
            .destination
            .as_deref()
            .ok_or_else(|| "missing destination".to_string())?;

        let (host, dest_path) = parse_dest_spec(destination);
        if dest_path.is_empty() {
            return Err(format!("empty destination path in '{}'", destination));
        }

        let block_size = match &args.block_size {
            Some(s) => parse_size(s)?,
            None => DEFAULT_BLOCK_SIZE,
        };
        if block_size == 0 {
            return Err("block size must be greater than zero".to_string());
        }

        let hash_name = args.hash.as_deref().unwrap_or(DEFAULT_HASH);
        let algorithm =
            HashAlgorithm::from_wire_name(hash_name).map_err(|e| e.to_string())?;

        Ok(Self {
            source,
            host,
            dest_path,
            block_size,
            algorithm,
            remote_program: args.remote_program.clone(),
            ssh_program: args.ssh_program.clone(),
        })
    }

    /// Whether the agent runs as a direct local child
    pub fn is_local(&self) -> bool {
        self.host == LOCAL_HOST
    }
}

/// Split a `[HOST:]PATH` destination spec.
///
/// Everything before the first colon is the host; without a colon the whole
/// spec is a local path.
pub fn parse_dest_spec(spec: &str) -> (String, String) {
    match spec.split_once(':') {
        Some((host, path)) if !host.is_empty() => (host.to_string(), path.to_string()),
        _ => (LOCAL_HOST.to_string(), spec.trim_start_matches(':').to_string()),
    }
}

/// Parse a human-readable size string (e.g. "4M", "64K", "1G", "4194304")
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            source: Some(PathBuf::from("/tmp/src.img")),
            destination: Some("host:/srv/dst.img".to_string()),
            block_size: None,
            hash: None,
            progress: false,
            quiet: false,
            verbose: 0,
            remote_program: "blocksync".to_string(),
            ssh_program: "ssh".to_string(),
            command: None,
        }
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4M").unwrap(), 4 * 1024 * 1024);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("1.5M").unwrap(), 3 * 512 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_parse_dest_spec() {
        assert_eq!(
            parse_dest_spec("host:/srv/disk.img"),
            ("host".to_string(), "/srv/disk.img".to_string())
        );
        assert_eq!(
            parse_dest_spec("/srv/disk.img"),
            (LOCAL_HOST.to_string(), "/srv/disk.img".to_string())
        );
        assert_eq!(
            parse_dest_spec("host:rel/path"),
            ("host".to_string(), "rel/path".to_string())
        );
    }

    #[test]
    fn test_from_cli_defaults() {
        let config = TransferConfig::from_cli(&base_args()).unwrap();
        assert_eq!(config.host, "host");
        assert_eq!(config.dest_path, "/srv/dst.img");
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.algorithm, HashAlgorithm::Sha3_512);
        assert!(!config.is_local());
    }

    #[test]
    fn test_from_cli_rejects_zero_block_size() {
        let mut args = base_args();
        args.block_size = Some("0".to_string());
        assert!(TransferConfig::from_cli(&args).is_err());
    }

    #[test]
    fn test_from_cli_resolves_hash_aliases() {
        let mut args = base_args();
        args.hash = Some("sha3-512".to_string());
        let config = TransferConfig::from_cli(&args).unwrap();
        assert_eq!(config.algorithm, HashAlgorithm::Sha3_512);

        args.hash = Some("md5".to_string());
        assert!(TransferConfig::from_cli(&args).is_err());
    }
}
