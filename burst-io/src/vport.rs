//! # Virtual NIC
//!
//! ## Purpose
//!
//! An in-memory stand-in for a poll-mode NIC, so the benchmark runs end to end
//! without hardware. Two `VirtualPort`s joined by a pair of wires behave like two
//! hosts connected back to back.
//!
//! ## How it works
//!
//! A wire is a bounded [`Ring`] of buffers and plays the role of a TX descriptor
//! ring: `transmit_burst` moves the sender's buffers onto it until it is full, so
//! a slow receiver shows up as partial sends. On the far side `receive_burst`
//! takes frames off the wire, copies each into a buffer from the pool bound at
//! configure time and drops the wire buffer, which returns it to the sender's
//! pool (the equivalent of a TX completion). Frames are counted into per-port
//! atomic counters that other threads may read through a [`StatsHandle`].
//!
//! Receive drops are counted in `imissed`: frames not addressed to the port when
//! promiscuous mode is off, frames larger than `max_frame_len` or the RX slot size,
//! and frames arriving while the RX pool is empty. Oversized transmits are
//! accepted by the port but dropped and counted in `oerrors`.
//!
//! ## Main components
//!
//! - `VirtualPort`: One endpoint, implements [`Port`].
//! - `VirtualNic`: The set of ports visible to one host.
//! - `StatsHandle`: Read-only view of a port's counters.

use crate::error::SetupError;
use crate::pool::{Buffer, BufferPool};
use crate::port::{BROADCAST_MAC, MacAddr, Port, PortConfig, PortStats};
use crate::ring::{Ring, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Locally administered addresses for the two ends of a pair.
pub const DEFAULT_MAC_A: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const DEFAULT_MAC_B: MacAddr = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

/// One direction of a link: frames in flight, oldest first.
pub type VirtualWire = Arc<Ring<Buffer>>;

#[derive(Default)]
struct PortCounters {
    ipackets: AtomicU64,
    opackets: AtomicU64,
    ibytes: AtomicU64,
    obytes: AtomicU64,
    imissed: AtomicU64,
    oerrors: AtomicU64,
}

impl PortCounters {
    fn snapshot(&self) -> PortStats {
        PortStats {
            ipackets: self.ipackets.load(Ordering::Relaxed),
            opackets: self.opackets.load(Ordering::Relaxed),
            ibytes: self.ibytes.load(Ordering::Relaxed),
            obytes: self.obytes.load(Ordering::Relaxed),
            imissed: self.imissed.load(Ordering::Relaxed),
            oerrors: self.oerrors.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of a port's counters, usable from a control thread.
#[derive(Clone)]
pub struct StatsHandle(Arc<PortCounters>);

impl StatsHandle {
    pub fn stats(&self) -> PortStats {
        self.0.snapshot()
    }
}

struct Started {
    config: PortConfig,
    rx_pool: BufferPool,
}

/// One endpoint of a virtual link.
pub struct VirtualPort {
    id: u16,
    mac: MacAddr,
    rx: VirtualWire,
    tx: VirtualWire,
    started: Option<Started>,
    counters: Arc<PortCounters>,
}

impl VirtualPort {
    /// Creates two ports connected back to back; each wire holds up to `depth` frames.
    pub fn pair(depth: usize) -> Result<(VirtualPort, VirtualPort), SetupError> {
        let a_to_b: VirtualWire = Arc::new(Ring::with_capacity(depth)?);
        let b_to_a: VirtualWire = Arc::new(Ring::with_capacity(depth)?);
        Ok((
            VirtualPort::new(DEFAULT_MAC_A, Arc::clone(&b_to_a), Arc::clone(&a_to_b)),
            VirtualPort::new(DEFAULT_MAC_B, a_to_b, b_to_a),
        ))
    }

    /// Creates a port whose transmitted frames come back on its own RX queue.
    pub fn loopback(depth: usize) -> Result<VirtualPort, SetupError> {
        let wire: VirtualWire = Arc::new(Ring::with_capacity(depth)?);
        Ok(VirtualPort::new(DEFAULT_MAC_A, Arc::clone(&wire), wire))
    }

    fn new(mac: MacAddr, rx: VirtualWire, tx: VirtualWire) -> Self {
        VirtualPort {
            id: 0,
            mac,
            rx,
            tx,
            started: None,
            counters: Arc::default(),
        }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = mac;
        self
    }

    /// Applies `config`, binds the pool RX buffers are drawn from and starts the port.
    pub fn configure(&mut self, config: PortConfig, rx_pool: BufferPool) -> Result<(), SetupError> {
        config.validate().map_err(|reason| SetupError::PortConfig {
            port: self.id,
            reason,
        })?;
        if self.started.is_some() {
            return Err(SetupError::PortConfig {
                port: self.id,
                reason: "port is already started".into(),
            });
        }
        log::debug!(
            "port {}: rx ring {}, tx ring {}, max frame {}, promiscuous {}",
            self.id,
            config.rx_ring_size,
            config.tx_ring_size,
            config.max_frame_len,
            config.promiscuous
        );
        self.started = Some(Started { config, rx_pool });
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle(Arc::clone(&self.counters))
    }

    /// Frames waiting on this port's RX wire.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }
}

fn accepts(mac: &MacAddr, frame: &[u8]) -> bool {
    frame.len() >= 6 && (frame[..6] == mac[..] || frame[..6] == BROADCAST_MAC[..])
}

impl Port for VirtualPort {
    fn id(&self) -> u16 {
        self.id
    }

    fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    fn receive_burst(&mut self, out: &mut Vec<Buffer>, max_n: usize) -> usize {
        let Some(started) = &self.started else {
            return 0;
        };
        let counters = &self.counters;
        let mut received = 0;
        while received < max_n {
            let Some(frame) = self.rx.try_receive() else {
                break;
            };
            let len = frame.len();
            if len > started.config.max_frame_len
                || (!started.config.promiscuous && !accepts(&self.mac, frame.as_slice()))
            {
                counters.imissed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let Some(mut buf) = started.rx_pool.acquire() else {
                counters.imissed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if buf.append(frame.as_slice()).is_err() {
                counters.imissed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            counters.ipackets.fetch_add(1, Ordering::Relaxed);
            counters.ibytes.fetch_add(len as u64, Ordering::Relaxed);
            out.push(buf);
            received += 1;
        }
        received
    }

    fn transmit_burst(&mut self, bufs: &mut Vec<Buffer>) -> usize {
        let Some(started) = &self.started else {
            return 0;
        };
        let counters = &self.counters;
        // This port is the wire's only producer, so free room can only grow meanwhile.
        let room = self.tx.capacity() - self.tx.len();
        let count = room.min(bufs.len());
        for buf in bufs.drain(..count) {
            let len = buf.len();
            if len > started.config.max_frame_len {
                counters.oerrors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            match self.tx.try_send(buf) {
                Ok(()) => {
                    counters.opackets.fetch_add(1, Ordering::Relaxed);
                    counters.obytes.fetch_add(len as u64, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    // Another producer shares this queue; the frame is lost like a NIC TX error.
                    counters.oerrors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        count
    }

    fn stats(&self) -> PortStats {
        self.counters.snapshot()
    }
}

/// The ports visible to one host.
#[derive(Default)]
pub struct VirtualNic {
    ports: Vec<VirtualPort>,
}

impl VirtualNic {
    pub fn new() -> Self {
        VirtualNic::default()
    }

    pub fn with_port(mut self, port: VirtualPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Removes and returns the port with `id`.
    pub fn take_port(&mut self, id: u16) -> Option<VirtualPort> {
        let index = self.ports.iter().position(|p| p.id == id)?;
        Some(self.ports.swap_remove(index))
    }

    pub fn into_ports(self) -> Vec<VirtualPort> {
        self.ports
    }
}
