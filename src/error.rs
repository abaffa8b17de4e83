//! Error types for BlockSync
//!
//! This module defines all error types used throughout the application,
//! providing detailed error information for debugging and user feedback.

use crate::protocol::TransferPhase;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for BlockSync operations
#[derive(Error, Debug)]
pub enum BlockSyncError {
    /// I/O error during file operations
    #[error("I/O error at '{}': {}", .path.display(), .source)]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Source path is not a readable regular file
    #[error("Source is not a regular file: {}", .0.display())]
    InvalidSource(PathBuf),

    /// Failed to spawn the agent process
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that could not be started
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration / argument error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hash algorithm not known to this build
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    /// Agent did not come up far enough to echo a valid sanity digest
    #[error("Remote agent failed to start: {0}")]
    RemoteStartupFailed(String),

    /// Destination file is shorter than the source
    #[error("Destination too small (local: {local} bytes, remote: {remote} bytes)")]
    DestinationTooSmall {
        /// Source file size in bytes
        local: u64,
        /// Destination file size in bytes
        remote: u64,
    },

    /// Whole-file digest disagreement after transfer
    #[error("Integrity check failed after transfer: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Digest the driver computed over the source
        expected: String,
        /// Digest the agent computed over the destination
        actual: String,
    },

    /// Framing violation: short read or malformed frame
    #[error("Protocol error during {phase}: {message}")]
    Protocol {
        /// Phase the transfer was in when the violation was observed
        phase: TransferPhase,
        /// What went wrong
        message: String,
    },

    /// Stream-level transport failure that is not a framing violation
    #[error("Transport failure during {phase}: {source}")]
    Transport {
        /// Phase the transfer was in when the stream broke
        phase: TransferPhase,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl BlockSyncError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a protocol error tagged with the current phase
    pub fn protocol(phase: TransferPhase, message: impl Into<String>) -> Self {
        Self::Protocol {
            phase,
            message: message.into(),
        }
    }

    /// Create an integrity mismatch error from raw digests
    pub fn integrity_mismatch(expected: &[u8], actual: &[u8]) -> Self {
        Self::IntegrityMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }
}

/// Result type alias for BlockSync operations
pub type Result<T> = std::result::Result<T, BlockSyncError>;

impl From<std::io::Error> for BlockSyncError {
    fn from(err: std::io::Error) -> Self {
        BlockSyncError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BlockSyncError::io(path, e))
    }
}
