//! # Worker Loops
//!
//! ## Purpose
//!
//! The steady-state side of the benchmark. Each worker owns one role and runs on
//! its own thread, polling without ever blocking on the fast path.
//!
//! ## How it works
//!
//! Workers are plain structs generic over [`burst_io::Port`]. A single iteration
//! is exposed as `poll_once`/`send_once` so that tests can drive a worker step by
//! step; `run` repeats it until the [`StopSignal`] is raised, checking the
//! flag at the top of each iteration. Buffers are only held for the duration of
//! one iteration: whatever a worker takes from a pool, a port or a ring goes back
//! to a pool, a port or a ring before the next iteration starts.
//!
//! ## Main components
//!
//! - `ReceiverWorker`: Polls the port, counts and releases what arrives.
//! - `RelayProducer` / `RelayConsumer`: Receiver that publishes a counter message
//!   per burst, and the worker that consumes those messages.
//! - `SenderWorker`: Synthesizes bursts, transmits them, releases what the port
//!   did not take.

mod receiver;
mod relay;
mod sender;
mod stop;

pub use receiver::{PollOutcome, ReceiverReport, ReceiverState, ReceiverWorker};
pub use relay::{RelayConsumer, RelayConsumerReport, RelayProducer, RelayStats};
pub use sender::{SenderReport, SenderWorker};
pub use stop::StopSignal;
