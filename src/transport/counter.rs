//! Byte-counting stream decorators
//!
//! Thin wrappers around the transport's two halves. Every read and write
//! bumps a monotonic counter; the counts feed the driver's summary line and
//! never affect the protocol. The writer flushes after every write: the
//! protocol is strictly ping-pong at phase boundaries, and user-space
//! buffering on the driver side would deadlock the handshake.

use std::io::{self, Read, Write};

/// Counting decorator for the read half
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    /// Total bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Counting, flush-on-write decorator for the write half
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        self.inner.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
