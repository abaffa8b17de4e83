//! Delta-transfer protocol
//!
//! Both ends of the block-differential exchange: the driver (source side)
//! streams a handshake, receives per-block fingerprints, and emits patch
//! frames; the agent (destination side) fingerprints its copy, applies the
//! patches, and answers with a whole-file digest. The wire codec shared by
//! both lives in [`wire`].

pub mod agent;
pub mod driver;
pub mod wire;

pub use driver::{transfer, TransferStats};

/// Protocol phase, used to tag errors with where a transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Header write, sanity echo, go token
    Handshake,
    /// Remote size and per-block digest vector
    DigestExchange,
    /// Patch frame emission / application
    PatchStream,
    /// Whole-file digest verification
    Finalize,
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::DigestExchange => "digest exchange",
            Self::PatchStream => "patch stream",
            Self::Finalize => "finalize",
        };
        write!(f, "{}", name)
    }
}
