//! Error types shared by the pool, ring and port layers.
//!
//! Setup failures are fatal to the caller (a misconfigured deployment),
//! while steady-state exhaustion is never reported through these types:
//! `acquire` returns `None` and `try_send` hands the item back.

use std::io;
use thiserror::Error;

/// Failures while building the I/O environment: pools, rings, ports.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("there must be exactly one port, found {0}")]
    PortCount(usize),
    #[error("cannot init port {port}: {reason}")]
    PortConfig { port: u16, reason: String },
    #[error("cannot create pool {name}: {reason}")]
    Pool { name: String, reason: String },
    #[error("cannot create ring: {0}")]
    Ring(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors from manipulating the valid region of a [`crate::Buffer`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("length {len} exceeds buffer capacity {capacity}")]
    TooLong { len: usize, capacity: usize },
}
