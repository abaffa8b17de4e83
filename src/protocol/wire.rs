//! Wire codec for the delta-transfer protocol
//!
//! All integers are unsigned little-endian. The handshake header carries the
//! transfer parameters; after it, every frame length is derivable from
//! `(size, block_size, hash_name)`, so nothing else on the wire is
//! self-describing.

use crate::error::{BlockSyncError, Result};
use crate::protocol::TransferPhase;
use std::io::{self, Read, Write};

/// Token the driver sends after verifying the sanity echo
pub const GO_TOKEN: [u8; 2] = *b"go";

/// Fixed part of the handshake header: four u64 fields
pub const HEADER_FIXED_LEN: usize = 32;

/// Upper bound on `dest_path_len`; larger values are a protocol violation
pub const MAX_DEST_PATH_LEN: u64 = 4096;

/// Upper bound on `hash_name_len`; larger values are a protocol violation
pub const MAX_HASH_NAME_LEN: u64 = 64;

/// Handshake header: transfer parameters sent by the driver before anything
/// else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Source file size in bytes
    pub size: u64,
    /// Block size in bytes (> 0)
    pub block_size: u64,
    /// Destination path as raw UTF-8 bytes (the sanity digest covers these
    /// bytes exactly as transmitted)
    pub dest_path: Vec<u8>,
    /// Hash algorithm identifier (ASCII)
    pub hash_name: String,
}

impl Handshake {
    /// Total encoded length in bytes
    pub fn encoded_len(&self) -> u64 {
        HEADER_FIXED_LEN as u64 + self.dest_path.len() as u64 + self.hash_name.len() as u64
    }

    /// Serialize the header to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u64(writer, self.size)?;
        write_u64(writer, self.block_size)?;
        write_u64(writer, self.dest_path.len() as u64)?;
        write_u64(writer, self.hash_name.len() as u64)?;
        writer.write_all(&self.dest_path)?;
        writer.write_all(self.hash_name.as_bytes())?;
        Ok(())
    }

    /// Parse a header from a reader, enforcing the length caps and
    /// `block_size > 0`
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let phase = TransferPhase::Handshake;

        let size = read_u64(reader).map_err(|e| short_read(phase, "header", e))?;
        let block_size = read_u64(reader).map_err(|e| short_read(phase, "header", e))?;
        let dest_path_len = read_u64(reader).map_err(|e| short_read(phase, "header", e))?;
        let hash_name_len = read_u64(reader).map_err(|e| short_read(phase, "header", e))?;

        if block_size == 0 {
            return Err(BlockSyncError::protocol(phase, "block size is zero"));
        }
        if dest_path_len > MAX_DEST_PATH_LEN {
            return Err(BlockSyncError::protocol(
                phase,
                format!(
                    "destination path length {} exceeds cap {}",
                    dest_path_len, MAX_DEST_PATH_LEN
                ),
            ));
        }
        if hash_name_len > MAX_HASH_NAME_LEN {
            return Err(BlockSyncError::protocol(
                phase,
                format!(
                    "hash name length {} exceeds cap {}",
                    hash_name_len, MAX_HASH_NAME_LEN
                ),
            ));
        }

        let mut dest_path = vec![0u8; dest_path_len as usize];
        reader
            .read_exact(&mut dest_path)
            .map_err(|e| short_read(phase, "destination path", e))?;

        let mut hash_name = vec![0u8; hash_name_len as usize];
        reader
            .read_exact(&mut hash_name)
            .map_err(|e| short_read(phase, "hash name", e))?;
        if !hash_name.is_ascii() {
            return Err(BlockSyncError::protocol(phase, "hash name is not ASCII"));
        }
        let hash_name = String::from_utf8(hash_name)
            .map_err(|_| BlockSyncError::protocol(phase, "hash name is not UTF-8"))?;

        Ok(Self {
            size,
            block_size,
            dest_path,
            hash_name,
        })
    }
}

/// Number of blocks covering `size` bytes: `ceil(size / block_size)`
pub fn block_count(size: u64, block_size: u64) -> u64 {
    debug_assert!(block_size > 0);
    size.div_ceil(block_size)
}

/// Write a u64 as little-endian
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a little-endian u64
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Fill `buf` completely, or report how far the stream got before EOF.
///
/// Unlike `read_exact` this distinguishes "EOF on a frame boundary" (returns
/// `Ok(0)`) from a torn frame (returns the partial count), which the patch
/// loop needs to tell a clean shutdown from a framing violation.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn short_read(phase: TransferPhase, what: &str, err: io::Error) -> BlockSyncError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        BlockSyncError::protocol(phase, format!("short read while reading {}", what))
    } else {
        BlockSyncError::Transport { phase, source: err }
    }
}
