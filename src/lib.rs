//! # BlockSync - block-level differential file synchronization
//!
//! BlockSync updates a copy of a large, mostly-stable binary file (a VM disk
//! image, a database snapshot) on a remote host, transferring only the
//! blocks whose contents differ. It costs a single round trip of block
//! fingerprints rather than a rolling-checksum search: the destination
//! offers one fingerprint per fixed-size block, the source replies with the
//! exact byte ranges that disagree, and both sides verify a whole-file
//! cryptographic digest at the end.
//!
//! ## How it works
//!
//! The driver (source side) spawns the agent (destination side) through a
//! transport (a direct child process locally, an ssh session remotely) and
//! speaks a framed binary protocol over the agent's stdin/stdout:
//!
//! 1. Driver sends the transfer parameters; agent echoes a sanity digest.
//! 2. Driver confirms with a go token.
//! 3. Agent streams its per-block digest vector; driver streams back patch
//!    frames for mismatched blocks, reading the source exactly once.
//! 4. Driver closes its write side; agent answers with a whole-file digest
//!    the driver verifies against its own.
//!
//! ## Quick start
//!
//! ```no_run
//! use blocksync::config::TransferConfig;
//! use blocksync::progress::ProgressReporter;
//! use blocksync::protocol::transfer;
//! use std::path::PathBuf;
//!
//! let config = TransferConfig {
//!     source: PathBuf::from("disk.img"),
//!     host: "backup".to_string(),
//!     dest_path: "/srv/images/disk.img".to_string(),
//!     block_size: 4 * 1024 * 1024,
//!     algorithm: Default::default(),
//!     remote_program: "blocksync".to_string(),
//!     ssh_program: "ssh".to_string(),
//! };
//!
//! let stats = transfer(&config, &ProgressReporter::disabled()).unwrap();
//! eprintln!("{}", stats.summary_line());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod hash;
pub mod progress;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use config::TransferConfig;
pub use error::{BlockSyncError, Result};
pub use hash::HashAlgorithm;
pub use protocol::{transfer, TransferStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use blocksync::prelude::*;
    //! ```

    pub use crate::config::{parse_size, CliArgs, TransferConfig};
    pub use crate::error::{BlockSyncError, Result};
    pub use crate::hash::HashAlgorithm;
    pub use crate::progress::ProgressReporter;
    pub use crate::protocol::{transfer, TransferStats};
}
