//!
//! # Burst I/O
//!
//! Building blocks for poll-mode packet processing: a fixed-size buffer pool over
//! a pre-faulted memory arena, a bounded lock-free ring that moves buffer handles
//! between workers, a burst-oriented port abstraction with an in-memory virtual
//! NIC, and the small pieces a polling worker needs around them (throughput
//! sampling, the relay message record, a back-off policy for empty polls).
//!
//! Nothing on the fast path blocks or allocates. Exhaustion is reported in-band:
//! `acquire` returns `None`, `try_send` hands the item back, `receive_burst`
//! returns fewer buffers than asked for.
//!

pub mod backoff;
pub mod error;
pub mod message;
pub mod mmap;
pub mod pool;
pub mod port;
pub mod ring;
pub mod sampler;
pub mod vport;

pub use backoff::{Backoff, BackoffPolicy};
pub use error::{BufferError, SetupError};
pub use message::{CounterMessage, MESSAGE_LEN, MessageError};
pub use pool::{Buffer, BufferPool, PoolCache, PoolConfig};
pub use port::{MacAddr, MacDisplay, Port, PortConfig, PortStats};
pub use ring::{Receiver, Ring, Sender, TrySendError, channel};
pub use sampler::{Sample, Throughput, ThroughputSampler};
pub use vport::{StatsHandle, VirtualNic, VirtualPort, VirtualWire};

#[cfg(test)]
mod tests;
