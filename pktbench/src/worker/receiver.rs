use super::StopSignal;
use crate::report::{Direction, ThroughputReport};
use burst_io::{Buffer, Port, PortStats, SetupError, ThroughputSampler};
use std::time::{Duration, Instant};

/// Whether the receiver has seen traffic yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No packet yet, the clock is not running.
    Idle,
    /// Counting since the first non-empty burst.
    Steady,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOutcome {
    pub received: usize,
    pub bytes: u64,
    /// Set when this burst closed a sampling window.
    pub report: Option<ThroughputReport>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiverReport {
    pub polls: u64,
    pub packets: u64,
    pub bytes: u64,
    /// Time since the first packet, `None` if nothing arrived.
    pub elapsed: Option<Duration>,
    /// Port counter deltas since the worker was created.
    pub nic: PortStats,
}

pub struct ReceiverWorker<P: Port> {
    port: P,
    burst_size: usize,
    burst: Vec<Buffer>,
    sampler: ThroughputSampler,
    baseline: PortStats,
    polls: u64,
}

impl<P: Port> ReceiverWorker<P> {
    pub fn new(port: P, burst_size: usize, window_log2: u32) -> Result<Self, SetupError> {
        let sampler = ThroughputSampler::with_window_log2(window_log2)?;
        let baseline = port.stats();
        Ok(ReceiverWorker {
            port,
            burst_size,
            burst: Vec::with_capacity(burst_size),
            sampler,
            baseline,
            polls: 0,
        })
    }

    pub fn state(&self) -> ReceiverState {
        if self.sampler.is_armed() {
            ReceiverState::Steady
        } else {
            ReceiverState::Idle
        }
    }

    pub fn packets(&self) -> u64 {
        self.sampler.total_packets()
    }

    pub fn bytes(&self) -> u64 {
        self.sampler.total_bytes()
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// When the first packet arrived.
    pub fn started_at(&self) -> Option<Instant> {
        self.sampler.started_at()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Port counter deltas since the worker was created.
    pub fn nic_stats(&self) -> PortStats {
        self.port.stats().since(&self.baseline)
    }

    /// Receives one burst, counts it and releases every buffer.
    pub fn poll_once(&mut self) -> PollOutcome {
        self.polls += 1;
        let received = self.port.receive_burst(&mut self.burst, self.burst_size);
        if received == 0 {
            return PollOutcome {
                received: 0,
                bytes: 0,
                report: None,
            };
        }
        let bytes = self.burst.iter().map(|b| b.len() as u64).sum();
        self.burst.clear();
        log::trace!("port {}: burst of {received}", self.port.id());

        let was_idle = self.state() == ReceiverState::Idle;
        let report = self
            .sampler
            .record(Instant::now(), received as u64, bytes)
            .map(|sample| {
                let report = ThroughputReport::from_sample(Direction::Rx, &sample, self.nic_stats());
                report.log();
                report
            });
        if was_idle {
            log::info!("port {}: first burst, timer started", self.port.id());
        }
        PollOutcome {
            received,
            bytes,
            report,
        }
    }

    pub fn report(&self) -> ReceiverReport {
        ReceiverReport {
            polls: self.polls,
            packets: self.packets(),
            bytes: self.bytes(),
            elapsed: self.started_at().map(|start| start.elapsed()),
            nic: self.nic_stats(),
        }
    }

    /// Polls until `stop` is cancelled.
    pub fn run(&mut self, stop: &StopSignal) -> ReceiverReport {
        log::info!("receiver on port {} started", self.port.id());
        while !stop.is_cancelled() {
            self.poll_once();
        }
        let report = self.report();
        log::info!(
            "receiver on port {} stopped: {} packets, {} bytes in {} polls",
            self.port.id(),
            report.packets,
            report.bytes,
            report.polls
        );
        report
    }
}
