//! Transport layer
//!
//! Spawning the agent process (direct child or over ssh) and the
//! byte-counting stream decorators the driver wraps around its stdio pair.

mod counter;
mod spawn;

pub use counter::{CountingReader, CountingWriter};
pub use spawn::AgentProcess;
