//! # Port Abstraction
//!
//! ## Purpose
//!
//! A `Port` is one NIC queue pair seen from a polling worker: a burst receive
//! primitive that fills buffers drawn from the port's pool, and a burst transmit
//! primitive that takes ownership of as many buffers as the hardware accepts.
//!
//! ## How it works
//!
//! Both primitives are non-blocking and operate on a `Vec<Buffer>` owned by the
//! caller, so the hot path never allocates. `receive_burst` appends up to `max_n`
//! buffers; returning fewer, including none, is the common case for a poll-mode
//! device. `transmit_burst` removes the first `count_sent` buffers from the vector
//! and leaves the rest where they are: those still belong to the caller, and the
//! caller must release them. A queue is owned by exactly one worker; that is a
//! contract on the caller, not something the port checks.
//!
//! ## Main components
//!
//! - `Port`: The burst RX/TX trait.
//! - `PortStats`: Device-side packet and byte counters.
//! - `PortConfig`: Queue counts, ring depths, frame size and promiscuous mode.
//! - `MacDisplay`: Formats a MAC address the way startup logs print it.

use crate::pool::Buffer;
use std::fmt;

pub type MacAddr = [u8; 6];

pub const BROADCAST_MAC: MacAddr = [0xff; 6];

/// Device-side counters, as reported by the NIC rather than counted by workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub ipackets: u64,
    pub opackets: u64,
    pub ibytes: u64,
    pub obytes: u64,
    /// Frames dropped on receive: filtered, no free buffer, or too large.
    pub imissed: u64,
    /// Frames dropped on transmit.
    pub oerrors: u64,
}

impl PortStats {
    /// Counter deltas since `earlier`.
    pub fn since(&self, earlier: &PortStats) -> PortStats {
        PortStats {
            ipackets: self.ipackets.saturating_sub(earlier.ipackets),
            opackets: self.opackets.saturating_sub(earlier.opackets),
            ibytes: self.ibytes.saturating_sub(earlier.ibytes),
            obytes: self.obytes.saturating_sub(earlier.obytes),
            imissed: self.imissed.saturating_sub(earlier.imissed),
            oerrors: self.oerrors.saturating_sub(earlier.oerrors),
        }
    }
}

/// Port setup applied once before any worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub rx_queues: u16,
    pub tx_queues: u16,
    pub rx_ring_size: usize,
    pub tx_ring_size: usize,
    /// Largest frame accepted on either direction.
    pub max_frame_len: usize,
    pub promiscuous: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            rx_queues: 1,
            tx_queues: 1,
            rx_ring_size: 128,
            tx_ring_size: 512,
            max_frame_len: 1518,
            promiscuous: true,
        }
    }
}

impl PortConfig {
    /// Checks the configuration; the error text explains the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.rx_queues != 1 || self.tx_queues != 1 {
            return Err(format!(
                "exactly one RX and one TX queue are supported, got {} RX / {} TX",
                self.rx_queues, self.tx_queues
            ));
        }
        if self.rx_ring_size == 0 || self.tx_ring_size == 0 {
            return Err("ring sizes must be non-zero".into());
        }
        if self.max_frame_len == 0 {
            return Err("max frame length must be non-zero".into());
        }
        Ok(())
    }
}

/// One NIC queue pair driven by a polling worker.
pub trait Port {
    fn id(&self) -> u16;

    fn mac_addr(&self) -> MacAddr;

    /// Appends up to `max_n` received buffers to `out` and returns how many were appended.
    fn receive_burst(&mut self, out: &mut Vec<Buffer>, max_n: usize) -> usize;

    /// Transmits buffers from the front of `bufs`, removing the ones accepted.
    ///
    /// Returns `count_sent`, between 0 and `bufs.len()`. Buffers left in `bufs`
    /// are still owned by the caller.
    fn transmit_burst(&mut self, bufs: &mut Vec<Buffer>) -> usize;

    fn stats(&self) -> PortStats;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn id(&self) -> u16 {
        (**self).id()
    }

    fn mac_addr(&self) -> MacAddr {
        (**self).mac_addr()
    }

    fn receive_burst(&mut self, out: &mut Vec<Buffer>, max_n: usize) -> usize {
        (**self).receive_burst(out, max_n)
    }

    fn transmit_burst(&mut self, bufs: &mut Vec<Buffer>) -> usize {
        (**self).transmit_burst(bufs)
    }

    fn stats(&self) -> PortStats {
        (**self).stats()
    }
}

/// Formats a MAC address as space-separated hex octets.
pub struct MacDisplay<'a>(pub &'a MacAddr);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = *self.0;
        write!(f, "{a:02x} {b:02x} {c:02x} {d:02x} {e:02x} {g:02x}")
    }
}
