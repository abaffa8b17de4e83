//! Source-side protocol driver
//!
//! The driver owns the authoritative source file and walks the transfer
//! through its phases: handshake, digest exchange, patch streaming,
//! finalization. The source is read exactly once: the whole-file hash is
//! updated from the same buffer each block digest is computed from.

use crate::config::TransferConfig;
use crate::error::{BlockSyncError, IoResultExt, Result};
use crate::progress::ProgressReporter;
use crate::protocol::wire::{self, Handshake, GO_TOKEN};
use crate::protocol::TransferPhase;
use crate::transport::{AgentProcess, CountingReader, CountingWriter};
use std::fs::File;
use std::io::{self, Read, Write};
use tracing::{debug, warn};

/// Byte counters and size of a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes read from the agent
    pub bytes_in: u64,
    /// Bytes written to the agent
    pub bytes_out: u64,
    /// Source file size in bytes
    pub size: u64,
}

impl TransferStats {
    /// Ratio of file size to bytes actually moved over the transport
    pub fn speedup(&self) -> f64 {
        let moved = self.bytes_in + self.bytes_out;
        if moved == 0 {
            0.0
        } else {
            self.size as f64 / moved as f64
        }
    }

    /// The one-line summary the CLI reports on stderr
    pub fn summary_line(&self) -> String {
        format!(
            "in={} out={} size={} speedup={:.2}",
            self.bytes_in,
            self.bytes_out,
            self.size,
            self.speedup()
        )
    }
}

/// Run a complete transfer against a spawned agent.
///
/// Opens the source, spawns the agent through the configured transport,
/// drives the protocol to completion and reaps the agent process.
pub fn transfer(config: &TransferConfig, progress: &ProgressReporter) -> Result<TransferStats> {
    let mut source = File::open(&config.source).with_path(&config.source)?;
    let metadata = source.metadata().with_path(&config.source)?;
    if !metadata.is_file() {
        return Err(BlockSyncError::InvalidSource(config.source.clone()));
    }

    let mut agent = AgentProcess::spawn(config)?;
    let (stdin, stdout) = agent.take_streams();

    match run(&mut source, metadata.len(), config, stdout, stdin, progress) {
        Ok(stats) => {
            agent.wait()?;
            progress.finish_success();
            Ok(stats)
        }
        Err(e) => {
            agent.abort();
            progress.finish_error();
            Err(e)
        }
    }
}

/// Drive one transfer over an arbitrary stream pair.
///
/// `source` is read sequentially from its current position (callers pass a
/// freshly opened file). `size` is the number of source bytes to sync. This
/// is the seam the process transport plugs into; tests wire it to an
/// in-process agent instead.
pub fn run<R: Read, W: Write>(
    source: &mut File,
    size: u64,
    config: &TransferConfig,
    reader: R,
    writer: W,
    progress: &ProgressReporter,
) -> Result<TransferStats> {
    let session = Session {
        reader: CountingReader::new(reader),
        writer: Some(CountingWriter::new(writer)),
        config,
        size,
    };
    session.run(source, progress)
}

/// Driver-side protocol state, advanced phase by phase
struct Session<'a, R: Read, W: Write> {
    reader: CountingReader<R>,
    writer: Option<CountingWriter<W>>,
    config: &'a TransferConfig,
    size: u64,
}

impl<R: Read, W: Write> Session<'_, R, W> {
    fn run(mut self, source: &mut File, progress: &ProgressReporter) -> Result<TransferStats> {
        progress.set_total_bytes(self.size);

        self.handshake()?;
        let digests = self.read_digests()?;
        let local_total = self.stream_patches(source, &digests, progress)?;
        self.finalize(&local_total)
    }

    fn writer(&mut self) -> &mut CountingWriter<W> {
        self.writer.as_mut().expect("write half already closed")
    }

    /// Phase H: header, sanity echo, go token
    fn handshake(&mut self) -> Result<()> {
        let phase = TransferPhase::Handshake;
        let algorithm = self.config.algorithm;

        let header = Handshake {
            size: self.size,
            block_size: self.config.block_size,
            dest_path: self.config.dest_path.clone().into_bytes(),
            hash_name: algorithm.wire_name().to_string(),
        };
        header
            .write_to(self.writer())
            .map_err(|e| BlockSyncError::Transport { phase, source: e })?;
        debug!(
            size = self.size,
            block_size = self.config.block_size,
            hash = %algorithm,
            "handshake sent"
        );

        // The echo proves the agent parsed the header and agrees on the
        // digest width. It is a startup confirmation, nothing more.
        let mut sanity = vec![0u8; algorithm.digest_len()];
        self.reader.read_exact(&mut sanity).map_err(|e| {
            BlockSyncError::RemoteStartupFailed(format!("no sanity digest from agent: {}", e))
        })?;

        let expected = algorithm.digest(self.config.dest_path.as_bytes());
        if sanity != expected {
            return Err(BlockSyncError::RemoteStartupFailed(
                "sanity digest mismatch".to_string(),
            ));
        }

        self.writer()
            .write_all(&GO_TOKEN)
            .map_err(|e| BlockSyncError::Transport { phase, source: e })?;
        Ok(())
    }

    /// Phase D: remote size, then the ordered per-block digest vector
    fn read_digests(&mut self) -> Result<Vec<u8>> {
        let phase = TransferPhase::DigestExchange;

        let remote_size = wire::read_u64(&mut self.reader)
            .map_err(|e| read_error(phase, "remote size", e))?;
        if remote_size < self.size {
            return Err(BlockSyncError::DestinationTooSmall {
                local: self.size,
                remote: remote_size,
            });
        }

        let count = wire::block_count(self.size, self.config.block_size);
        let digest_len = self.config.algorithm.digest_len();
        let mut digests = vec![0u8; (count as usize) * digest_len];
        self.reader
            .read_exact(&mut digests)
            .map_err(|e| read_error(phase, "block digest vector", e))?;

        debug!(remote_size, blocks = count, "digest vector received");
        Ok(digests)
    }

    /// Phase P: single pass over the source, patching mismatched blocks.
    ///
    /// Returns the whole-file digest computed during the pass. A broken pipe
    /// stops emission (the agent is gone) but the pass still completes so
    /// finalization can report what actually happened.
    fn stream_patches(
        &mut self,
        source: &mut File,
        digests: &[u8],
        progress: &ProgressReporter,
    ) -> Result<Vec<u8>> {
        let algorithm = self.config.algorithm;
        let block_size = self.config.block_size;
        let digest_len = algorithm.digest_len();
        let count = wire::block_count(self.size, block_size);

        let mut block = vec![0u8; block_size as usize];
        let mut total = algorithm.hasher();
        let mut patches = 0u64;
        let mut pipe_broken = false;

        for index in 0..count {
            let position = index * block_size;
            let len = block_size.min(self.size - position) as usize;
            source
                .read_exact(&mut block[..len])
                .with_path(&self.config.source)?;

            total.update(&block[..len]);
            let local = algorithm.digest(&block[..len]);
            let remote = &digests[(index as usize) * digest_len..(index as usize + 1) * digest_len];

            if local.as_slice() != remote && !pipe_broken {
                // The payload is always block_size bytes; on a short final
                // block the tail of the reused buffer rides along as scratch
                // padding, which the agent never hashes.
                match self.write_patch(position, &block) {
                    Ok(()) => {
                        patches += 1;
                        progress.inc_patches();
                    }
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        warn!("agent closed its input, ceasing patch emission");
                        pipe_broken = true;
                    }
                    Err(e) => {
                        return Err(BlockSyncError::Transport {
                            phase: TransferPhase::PatchStream,
                            source: e,
                        })
                    }
                }
            }
            progress.inc_bytes(len as u64);
        }

        debug!(patches, blocks = count, "source pass complete");
        Ok(total.finalize())
    }

    fn write_patch(&mut self, position: u64, payload: &[u8]) -> io::Result<()> {
        let writer = self.writer();
        wire::write_u64(writer, position)?;
        writer.write_all(payload)
    }

    /// Phase F: close the write half, verify the agent's whole-file digest
    fn finalize(mut self, local_total: &[u8]) -> Result<TransferStats> {
        let phase = TransferPhase::Finalize;

        let writer = self.writer.take().expect("write half already closed");
        let bytes_out = writer.bytes_written();
        // Dropping the write half is the end-of-patches signal
        drop(writer);

        let mut remote_total = vec![0u8; self.config.algorithm.digest_len()];
        match self.reader.read_exact(&mut remote_total) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // A transport torn down mid-transfer lands here; the
                // destination state is unknown, so report it as a failed
                // integrity check.
                return Err(BlockSyncError::IntegrityMismatch {
                    expected: hex::encode(local_total),
                    actual: "(agent closed the stream before the final digest)".to_string(),
                });
            }
            Err(e) => return Err(BlockSyncError::Transport { phase, source: e }),
        }

        if remote_total != local_total {
            return Err(BlockSyncError::integrity_mismatch(local_total, &remote_total));
        }

        Ok(TransferStats {
            bytes_in: self.reader.bytes_read(),
            bytes_out,
            size: self.size,
        })
    }
}

fn read_error(phase: TransferPhase, what: &str, err: io::Error) -> BlockSyncError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        BlockSyncError::protocol(phase, format!("short read while reading {}", what))
    } else {
        BlockSyncError::Transport { phase, source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use crate::protocol::{agent, pipe};
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    const BLOCK: u64 = 64 * 1024;

    fn test_config(source: &Path, dest: &Path, block_size: u64, hash: &str) -> TransferConfig {
        TransferConfig {
            source: source.to_path_buf(),
            host: "localhost".to_string(),
            dest_path: dest.to_string_lossy().to_string(),
            block_size,
            algorithm: HashAlgorithm::from_wire_name(hash).unwrap(),
            remote_program: "blocksync".to_string(),
            ssh_program: "ssh".to_string(),
        }
    }

    /// Run driver and agent in-process over a duplex pipe pair
    fn run_local(
        source_path: &Path,
        dest_path: &Path,
        block_size: u64,
        hash: &str,
    ) -> Result<TransferStats> {
        let config = test_config(source_path, dest_path, block_size, hash);

        let (agent_reader, driver_writer) = pipe::pair();
        let (driver_reader, agent_writer) = pipe::pair();
        let agent_thread = thread::spawn(move || agent::serve(agent_reader, agent_writer));

        let mut source = File::open(source_path).unwrap();
        let size = source.metadata().unwrap().len();
        let result = run(
            &mut source,
            size,
            &config,
            driver_reader,
            driver_writer,
            &ProgressReporter::disabled(),
        );
        let _ = agent_thread.join().unwrap();
        result
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Handshake + go bytes the driver always sends
    fn base_out(dest: &Path, hash_name_len: u64) -> u64 {
        32 + dest.to_string_lossy().len() as u64 + hash_name_len + 2
    }

    /// Sanity + remote size + digest vector + final digest
    fn base_in(blocks: u64, digest_len: u64) -> u64 {
        digest_len + 8 + blocks * digest_len + digest_len
    }

    #[test]
    fn test_fresh_copy() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let content = patterned(4 * BLOCK as usize);
        fs::write(&source_path, &content).unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        assert_eq!(stats.size, 4 * BLOCK);
        // A fresh sparse destination is all zeros: every block patched
        assert_eq!(
            stats.bytes_out,
            base_out(&dest_path, 8) + 4 * (8 + BLOCK)
        );
        assert_eq!(stats.bytes_in, base_in(4, 64));
        assert!(stats.speedup() > 0.0);

        assert_eq!(fs::read(&dest_path).unwrap(), content);
        assert_eq!(fs::metadata(&dest_path).unwrap().len(), 4 * BLOCK);
    }

    #[test]
    fn test_second_run_is_noop() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        fs::write(&source_path, patterned(3 * BLOCK as usize)).unwrap();

        run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();
        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        // No patch frames on the second run
        assert_eq!(stats.bytes_out, base_out(&dest_path, 8));
        assert_eq!(stats.bytes_in, base_in(3, 64));
    }

    #[test]
    fn test_one_block_edit() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let content = patterned(8 * BLOCK as usize);
        fs::write(&source_path, &content).unwrap();

        let mut tampered = content.clone();
        let position = 7 * BLOCK as usize;
        tampered[position] ^= 0xff;
        fs::write(&dest_path, &tampered).unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        // Exactly one patch frame, for block 7
        assert_eq!(stats.bytes_out, base_out(&dest_path, 8) + (8 + BLOCK));
        assert_eq!(fs::read(&dest_path).unwrap(), content);
    }

    #[test]
    fn test_short_last_block() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let size = 3 * BLOCK as usize + 7;
        let content = patterned(size);
        fs::write(&source_path, &content).unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        assert_eq!(stats.size, size as u64);
        // Four blocks, the last one short; patch payloads are still full
        // blocks
        assert_eq!(
            stats.bytes_out,
            base_out(&dest_path, 8) + 4 * (8 + BLOCK)
        );
        assert_eq!(fs::read(&dest_path).unwrap(), content);
        // The pad spill does not leak into the destination's length
        assert_eq!(fs::metadata(&dest_path).unwrap().len(), size as u64);
    }

    #[test]
    fn test_single_block_file() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let content = patterned(BLOCK as usize);
        fs::write(&source_path, &content).unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();
        assert_eq!(stats.bytes_in, base_in(1, 64));
        assert_eq!(fs::read(&dest_path).unwrap(), content);
    }

    #[test]
    fn test_empty_source() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        fs::write(&source_path, b"").unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        assert_eq!(stats.size, 0);
        assert_eq!(stats.bytes_out, base_out(&dest_path, 8));
        // Sanity + remote size + empty digest vector + digest of empty input
        assert_eq!(stats.bytes_in, base_in(0, 64));
        assert_eq!(fs::metadata(&dest_path).unwrap().len(), 0);
    }

    #[test]
    fn test_alternate_algorithm() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let content = patterned(2 * BLOCK as usize + 100);
        fs::write(&source_path, &content).unwrap();

        let stats = run_local(&source_path, &dest_path, BLOCK, "blake3").unwrap();
        assert_eq!(stats.bytes_in, base_in(3, 32));
        assert_eq!(fs::read(&dest_path).unwrap(), content);
    }

    #[test]
    fn test_longer_destination_tail_preserved() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let size = 2 * BLOCK as usize + 19;
        let content = patterned(size);
        fs::write(&source_path, &content).unwrap();

        // Destination carries a stale prefix plus 100 extra tail bytes
        let mut existing = content.clone();
        existing[5] ^= 0x55;
        existing.extend_from_slice(&[0xee; 100]);
        fs::write(&dest_path, &existing).unwrap();

        run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap();

        let after = fs::read(&dest_path).unwrap();
        assert_eq!(after.len(), size + 100);
        assert_eq!(&after[..size], content.as_slice());
        // The excess tail is unused but preserved
        assert!(after[size..].iter().all(|&b| b == 0xee));
    }

    #[test]
    fn test_destination_too_small() {
        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        let size = 2 * BLOCK as usize;
        fs::write(&source_path, patterned(size)).unwrap();
        // Pre-existing regular file one byte short of the source
        fs::write(&dest_path, patterned(size - 1)).unwrap();

        let err = run_local(&source_path, &dest_path, BLOCK, "sha3_512").unwrap_err();
        match err {
            BlockSyncError::DestinationTooSmall { local, remote } => {
                assert_eq!(local, size as u64);
                assert_eq!(remote, size as u64 - 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // No patch was applied
        assert_eq!(fs::read(&dest_path).unwrap(), patterned(size - 1));
    }

    #[test]
    fn test_tampered_sanity_echo() {
        use std::io::Write as _;

        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        fs::write(&source_path, patterned(BLOCK as usize)).unwrap();

        let config = test_config(&source_path, &dest_path, BLOCK, "sha3_512");

        let (mut peer_reader, driver_writer) = pipe::pair();
        let (driver_reader, mut peer_writer) = pipe::pair();
        let peer = thread::spawn(move || {
            // Parse the header, then echo garbage instead of the sanity
            // digest
            let header = Handshake::read_from(&mut peer_reader).unwrap();
            let d = HashAlgorithm::from_wire_name(&header.hash_name)
                .unwrap()
                .digest_len();
            peer_writer.write_all(&vec![0xaa; d]).unwrap();
        });

        let mut source = File::open(&source_path).unwrap();
        let err = run(
            &mut source,
            BLOCK,
            &config,
            driver_reader,
            driver_writer,
            &ProgressReporter::disabled(),
        )
        .unwrap_err();
        peer.join().unwrap();

        assert!(matches!(err, BlockSyncError::RemoteStartupFailed(_)));
        // Destination was never touched
        assert!(!dest_path.exists());
    }

    #[test]
    fn test_peer_dies_before_final_digest() {
        use std::io::Write as _;

        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("src.img");
        let dest_path = dir.path().join("dst.img");
        fs::write(&source_path, patterned(BLOCK as usize)).unwrap();

        let config = test_config(&source_path, &dest_path, BLOCK, "sha3_512");
        let algorithm = config.algorithm;
        let dest_bytes = config.dest_path.clone().into_bytes();

        let (mut peer_reader, driver_writer) = pipe::pair();
        let (driver_reader, mut peer_writer) = pipe::pair();
        let peer = thread::spawn(move || {
            // Behave through the digest exchange, then vanish without the
            // final digest
            let header = Handshake::read_from(&mut peer_reader).unwrap();
            peer_writer
                .write_all(&algorithm.digest(&dest_bytes))
                .unwrap();
            let mut token = [0u8; 2];
            peer_reader.read_exact(&mut token).unwrap();
            wire::write_u64(&mut peer_writer, header.size).unwrap();
            // All-zero digests guarantee at least one patch comes back
            let blocks = wire::block_count(header.size, header.block_size);
            peer_writer
                .write_all(&vec![0u8; blocks as usize * algorithm.digest_len()])
                .unwrap();
        });

        let mut source = File::open(&source_path).unwrap();
        let err = run(
            &mut source,
            BLOCK,
            &config,
            driver_reader,
            driver_writer,
            &ProgressReporter::disabled(),
        )
        .unwrap_err();
        peer.join().unwrap();

        assert!(matches!(err, BlockSyncError::IntegrityMismatch { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn transfer_converges_on_arbitrary_edits(
            size in 0usize..3000,
            block_size in 1u64..700,
            edits in proptest::collection::vec((any::<u16>(), any::<u8>()), 0..6),
        ) {
            let dir = TempDir::new().unwrap();
            let source_path = dir.path().join("src.bin");
            let dest_path = dir.path().join("dst.bin");

            let content = patterned(size);
            fs::write(&source_path, &content).unwrap();

            let mut existing = content.clone();
            for (pos, value) in edits {
                if !existing.is_empty() {
                    let index = pos as usize % existing.len();
                    existing[index] = value;
                }
            }
            fs::write(&dest_path, &existing).unwrap();

            let stats = run_local(&source_path, &dest_path, block_size, "sha3_512").unwrap();
            prop_assert_eq!(stats.size, size as u64);
            prop_assert_eq!(fs::read(&dest_path).unwrap(), content);
        }
    }
}
