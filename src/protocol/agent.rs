//! Destination-side agent
//!
//! The agent runs in a sandbox reachable only through its stdin/stdout: all
//! transfer parameters arrive on the wire, nothing on the command line. It
//! fingerprints its copy of the file block by block, applies the patch
//! frames the driver sends back, and answers with a whole-file digest over
//! the first `size` bytes.
//!
//! Invoked as `blocksync agent`, typically at the far end of an ssh session.

use crate::error::{BlockSyncError, IoResultExt, Result};
use crate::hash::HashAlgorithm;
use crate::protocol::wire::{self, Handshake, GO_TOKEN};
use crate::protocol::TransferPhase;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Run the agent over the process's stdin/stdout
pub fn run() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock())
}

/// Serve one transfer over an arbitrary stream pair.
///
/// Returns `Ok(())` both on a completed transfer and on the clean early
/// exits the protocol defines (missing go token, undersized destination);
/// any I/O or framing failure terminates the session with an error.
pub fn serve<R: Read, W: Write>(reader: R, writer: W) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    // Phase H: parse the header, echo the sanity digest, wait for "go"
    let Handshake {
        size,
        block_size,
        dest_path,
        hash_name,
    } = Handshake::read_from(&mut reader)?;
    let algorithm = HashAlgorithm::from_wire_name(&hash_name)?;
    debug!(size, block_size, hash = %algorithm, "handshake received");

    writer.write_all(&algorithm.digest(&dest_path))?;
    writer.flush()?;

    let mut token = [0u8; 2];
    match reader.read_exact(&mut token) {
        Ok(()) if token == GO_TOKEN => {}
        // Anything but the go token: leave without touching the destination
        _ => {
            debug!("no go token, exiting");
            return Ok(());
        }
    }

    let dest = PathBuf::from(String::from_utf8(dest_path).map_err(|_| {
        BlockSyncError::protocol(TransferPhase::Handshake, "destination path is not UTF-8")
    })?);

    let (mut file, is_regular) = prepare_destination(&dest, size)?;
    let remote_size = file.seek(SeekFrom::End(0)).with_path(&dest)?;
    wire::write_u64(&mut writer, remote_size)?;
    writer.flush()?;
    if remote_size < size {
        // The driver reports DestinationTooSmall from the size alone; no
        // digest is ever sent for an undersized destination
        debug!(remote_size, size, "destination too small");
        return Ok(());
    }

    // Phase D: ordered per-block digest vector
    emit_digests(&mut writer, &mut file, size, block_size, algorithm, &dest)?;
    writer.flush()?;

    // Phase P: apply patch frames until the driver closes its write half
    let patched = apply_patches(&mut reader, &mut file, block_size, &dest)?;
    if is_regular {
        // The fixed-length frame for a short final block spills past the
        // logical end; restore the pre-transfer length
        file.set_len(remote_size).with_path(&dest)?;
    }

    // Phase F: whole-file digest over the first `size` bytes
    file.seek(SeekFrom::Start(0)).with_path(&dest)?;
    let total = hash_prefix(&mut file, size, block_size, algorithm, &dest)?;
    writer.write_all(&total)?;
    writer.flush()?;

    debug!(patched, "transfer complete");
    Ok(())
}

/// Open the destination for patching.
///
/// An absent path becomes a fresh sparse file of the transfer size with mode
/// 0600. An existing regular file is used in place with content, length and
/// permissions preserved, so an unchanged destination produces zero patches
/// and an undersized one is detected rather than papered over. Non-regular
/// targets (block devices, FIFOs) are never created or resized.
fn prepare_destination(path: &Path, size: u64) -> Result<(File, bool)> {
    let is_regular = match fs::metadata(path) {
        Ok(meta) if meta.is_file() => true,
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .with_path(path)?;
            file.set_len(size).with_path(path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))
                    .with_path(path)?;
            }
            debug!(?path, size, "created sparse destination");
            true
        }
        Err(e) => return Err(BlockSyncError::io(path, e)),
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_path(path)?;
    Ok((file, is_regular))
}

/// Emit one digest per block, in ascending block order.
///
/// EOF before `size` bytes is a peer-side protocol violation; the agent
/// tolerates it by ceasing emission, leaving the driver to observe a short
/// vector and fail.
fn emit_digests<W: Write>(
    writer: &mut W,
    file: &mut File,
    size: u64,
    block_size: u64,
    algorithm: HashAlgorithm,
    dest: &Path,
) -> Result<()> {
    file.seek(SeekFrom::Start(0)).with_path(dest)?;
    let mut buf = vec![0u8; block_size as usize];
    let mut remaining = size;

    while remaining > 0 {
        let want = block_size.min(remaining) as usize;
        let got = wire::read_full(file, &mut buf[..want]).with_path(dest)?;
        if got == 0 {
            break;
        }
        writer.write_all(&algorithm.digest(&buf[..got]))?;
        if got < want {
            break;
        }
        remaining -= got as u64;
    }
    Ok(())
}

/// Apply `(position, payload)` frames until EOF on the read half.
///
/// Positions are trusted (the driver only emits block-aligned offsets below
/// `size`); duplicates overwrite, last write wins.
fn apply_patches<R: Read>(
    reader: &mut R,
    file: &mut File,
    block_size: u64,
    dest: &Path,
) -> Result<u64> {
    let phase = TransferPhase::PatchStream;
    let mut position_buf = [0u8; 8];
    let mut payload = vec![0u8; block_size as usize];
    let mut patched = 0u64;

    loop {
        let got = wire::read_full(reader, &mut position_buf)
            .map_err(|e| BlockSyncError::Transport { phase, source: e })?;
        if got == 0 {
            break;
        }
        if got < position_buf.len() {
            return Err(BlockSyncError::protocol(phase, "torn patch frame position"));
        }
        let position = u64::from_le_bytes(position_buf);

        reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                BlockSyncError::protocol(phase, "torn patch frame payload")
            } else {
                BlockSyncError::Transport { phase, source: e }
            }
        })?;

        file.seek(SeekFrom::Start(position)).with_path(dest)?;
        file.write_all(&payload).with_path(dest)?;
        patched += 1;
        trace!(position, "patch applied");
    }
    Ok(patched)
}

/// Hash the first `size` bytes of the destination
fn hash_prefix(
    file: &mut File,
    size: u64,
    block_size: u64,
    algorithm: HashAlgorithm,
    dest: &Path,
) -> Result<Vec<u8>> {
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; block_size as usize];
    let mut remaining = size;

    while remaining > 0 {
        let want = block_size.min(remaining) as usize;
        file.read_exact(&mut buf[..want]).with_path(dest)?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    Ok(hasher.finalize())
}
