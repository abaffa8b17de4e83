//! Hash computation module
//!
//! Provides the cryptographic hash algorithms both peers can resolve by
//! wire name, with streaming support for single-pass scan-and-hash.

mod digest;

pub use digest::*;
