//! Block fingerprints and whole-file digests
//!
//! Both peers resolve the textual hash identifier from the handshake to the
//! same algorithm and digest width; every digest on the wire is exactly that
//! wide. All hashers support streaming so the driver can fuse the whole-file
//! hash into its single read pass over the source.

use crate::error::{BlockSyncError, Result};
use sha2::Digest;

/// Hash algorithm both peers agree on for a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// SHA3-512 (64-byte digests), the canonical default
    #[default]
    Sha3_512,
    /// SHA3-256 (32-byte digests)
    Sha3_256,
    /// SHA-512 (64-byte digests)
    Sha512,
    /// SHA-256 (32-byte digests)
    Sha256,
    /// BLAKE3 (32-byte digests)
    Blake3,
}

impl HashAlgorithm {
    /// Resolve a textual hash identifier from the wire or CLI.
    ///
    /// Names are ASCII-lowercased and hyphens folded to underscores before
    /// matching, so `sha3-512` and `SHA3_512` resolve identically on both
    /// peers.
    pub fn from_wire_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "sha3_512" => Ok(Self::Sha3_512),
            "sha3_256" => Ok(Self::Sha3_256),
            "sha2_512" | "sha512" => Ok(Self::Sha512),
            "sha2_256" | "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(BlockSyncError::UnsupportedHashAlgorithm(name.to_string())),
        }
    }

    /// Canonical identifier sent in the handshake
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Sha3_512 => "sha3_512",
            Self::Sha3_256 => "sha3_256",
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Digest width `D` in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha3_512 | Self::Sha512 => 64,
            Self::Sha3_256 | Self::Sha256 | Self::Blake3 => 32,
        }
    }

    /// Create a streaming hasher for this algorithm
    pub fn hasher(&self) -> Hasher {
        match self {
            Self::Sha3_512 => Hasher::Sha3_512(sha3::Sha3_512::new()),
            Self::Sha3_256 => Hasher::Sha3_256(sha3::Sha3_256::new()),
            Self::Sha512 => Hasher::Sha512(sha2::Sha512::new()),
            Self::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            Self::Blake3 => Hasher::Blake3(blake3::Hasher::new()),
        }
    }

    /// One-shot digest of a byte slice
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Unified streaming hasher over all supported algorithms
pub enum Hasher {
    /// SHA3-512
    Sha3_512(sha3::Sha3_512),
    /// SHA3-256
    Sha3_256(sha3::Sha3_256),
    /// SHA-512
    Sha512(sha2::Sha512),
    /// SHA-256
    Sha256(sha2::Sha256),
    /// BLAKE3
    Blake3(blake3::Hasher),
}

impl Hasher {
    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha3_512(h) => h.update(data),
            Self::Sha3_256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finalize and return the raw digest bytes
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha3_512(h) => h.finalize().to_vec(),
            Self::Sha3_256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}
