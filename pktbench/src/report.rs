//! Throughput reports: NIC counters next to the worker's own counts.
//!
//! The NIC figure is computed from the port counter deltas since the worker was
//! created, the counted figure from the bytes the worker actually handled. The two
//! should agree; a gap points at drops between the device and the worker.

use burst_io::{PortStats, Sample, Throughput};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    pub direction: Direction,
    pub elapsed: Duration,
    /// Port counter deltas over the same period.
    pub nic: PortStats,
    pub packets: u64,
    pub bytes: u64,
}

impl ThroughputReport {
    pub fn from_sample(direction: Direction, sample: &Sample, nic: PortStats) -> Self {
        ThroughputReport {
            direction,
            elapsed: sample.elapsed,
            nic,
            packets: sample.total_packets,
            bytes: sample.total_bytes,
        }
    }

    /// Bytes the NIC reports for this report's direction.
    pub fn nic_bytes(&self) -> u64 {
        match self.direction {
            Direction::Rx => self.nic.ibytes,
            Direction::Tx => self.nic.obytes,
        }
    }

    pub fn nic_packets(&self) -> u64 {
        match self.direction {
            Direction::Rx => self.nic.ipackets,
            Direction::Tx => self.nic.opackets,
        }
    }

    pub fn nic_throughput(&self) -> Throughput {
        Throughput::from_bytes(self.nic_bytes(), self.elapsed)
    }

    pub fn counted_throughput(&self) -> Throughput {
        Throughput::from_bytes(self.bytes, self.elapsed)
    }

    pub fn log(&self) {
        let nic = &self.nic;
        log::info!("time diff: {:.6} s", self.elapsed.as_secs_f64());
        log::info!(
            "stats: ipackets {} opackets {} ibytes {} obytes {} imissed {} oerrors {}",
            nic.ipackets,
            nic.opackets,
            nic.ibytes,
            nic.obytes,
            nic.imissed,
            nic.oerrors
        );
        log::info!("counts: packets {} bytes {}", self.packets, self.bytes);
        log::info!("throughput on stats: {}", self.nic_throughput());
        log::info!("throughput on counts: {}", self.counted_throughput());
    }
}
