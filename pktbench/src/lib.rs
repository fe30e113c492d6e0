//!
//! # Packet Benchmark
//!
//! A synthetic packet sender and receiver for measuring poll-mode throughput,
//! plus a relay variant in which the receiver announces each burst to a second
//! worker over a bounded ring. Runs over the in-memory virtual NIC from
//! [`burst_io`], one worker per thread.
//!

pub mod config;
pub mod report;
pub mod runtime;
pub mod worker;

pub use config::{BenchConfig, RelayConfig};
pub use report::{Direction, ThroughputReport};
pub use runtime::{RelayChannels, Runtime, check_core_budget, pin_current_thread};
pub use worker::{
    ReceiverState, ReceiverWorker, RelayConsumer, RelayProducer, SenderWorker, StopSignal,
};
