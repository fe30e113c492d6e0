use super::StopSignal;
use crate::report::{Direction, ThroughputReport};
use burst_io::{Buffer, BufferPool, MacAddr, PoolCache, Port, PortStats, SetupError, ThroughputSampler};
use std::time::{Duration, Instant};

const ETHER_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SenderReport {
    /// Bursts attempted, at most the configured iteration budget.
    pub iterations: u64,
    /// Buffers the port did not accept and that were released again.
    pub unsent: u64,
    /// Bursts cut short because the pool ran dry.
    pub alloc_failures: u64,
    pub throughput: ThroughputReport,
}

/// Transmits synthesized bursts for a fixed number of iterations.
pub struct SenderWorker<P: Port> {
    port: P,
    cache: PoolCache,
    burst_size: usize,
    iterations: u64,
    frame: Vec<u8>,
    burst: Vec<Buffer>,
    sampler: ThroughputSampler,
    baseline: PortStats,
    sent: u64,
    unsent: u64,
    alloc_failures: u64,
}

/// `payload_len` bytes counting up from 0, wrapping at 256.
pub fn counting_payload(payload_len: usize) -> Vec<u8> {
    (0..payload_len).map(|i| i as u8).collect()
}

impl<P: Port> SenderWorker<P> {
    pub fn new(
        port: P,
        pool: &BufferPool,
        burst_size: usize,
        payload_len: usize,
        iterations: u64,
        window_log2: u32,
    ) -> Result<Self, SetupError> {
        if payload_len > pool.slot_size() {
            return Err(SetupError::Config(format!(
                "payload of {payload_len} bytes does not fit pool {} slots",
                pool.name()
            )));
        }
        let baseline = port.stats();
        Ok(SenderWorker {
            port,
            cache: pool.cache(),
            burst_size,
            iterations,
            frame: counting_payload(payload_len),
            burst: Vec::with_capacity(burst_size),
            sampler: ThroughputSampler::with_window_log2(window_log2)?,
            baseline,
            sent: 0,
            unsent: 0,
            alloc_failures: 0,
        })
    }

    /// Prefixes each frame with destination and source addresses, for peers
    /// that filter on MAC.
    pub fn with_ether_header(mut self, dst: MacAddr) -> Result<Self, SetupError> {
        let len = ETHER_HEADER_LEN + self.frame.len();
        if len > self.cache.pool().slot_size() {
            return Err(SetupError::Config(format!(
                "{len} byte frame does not fit pool {} slots",
                self.cache.pool().name()
            )));
        }
        let src = self.port.mac_addr();
        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&self.frame);
        self.frame = frame;
        Ok(self)
    }

    pub fn frame_len(&self) -> usize {
        self.frame.len()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn unsent(&self) -> u64 {
        self.unsent
    }

    pub fn alloc_failures(&self) -> u64 {
        self.alloc_failures
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Builds one burst, transmits it and releases what the port left behind.
    ///
    /// Returns the number of frames the port accepted.
    pub fn send_once(&mut self) -> usize {
        while self.burst.len() < self.burst_size {
            let Some(mut buf) = self.cache.acquire() else {
                self.alloc_failures += 1;
                log::debug!(
                    "pool {} empty, burst cut to {}",
                    self.cache.pool().name(),
                    self.burst.len()
                );
                break;
            };
            if buf.append(&self.frame).is_err() {
                self.cache.release(buf);
                break;
            }
            self.burst.push(buf);
        }
        if self.burst.is_empty() {
            return 0;
        }

        let sent = self.port.transmit_burst(&mut self.burst);
        for buf in self.burst.drain(..) {
            self.unsent += 1;
            self.cache.release(buf);
        }
        if sent > 0 {
            self.sent += sent as u64;
            let bytes = (sent * self.frame.len()) as u64;
            if let Some(sample) = self.sampler.record(Instant::now(), sent as u64, bytes) {
                let nic = self.port.stats().since(&self.baseline);
                ThroughputReport::from_sample(Direction::Tx, &sample, nic).log();
            }
        }
        sent
    }

    /// Sends the configured number of bursts, or fewer if `stop` is cancelled first.
    pub fn run(&mut self, stop: &StopSignal) -> SenderReport {
        log::info!(
            "sender on port {}: {} bursts of {} x {} bytes",
            self.port.id(),
            self.iterations,
            self.burst_size,
            self.frame.len()
        );
        let start = Instant::now();
        let mut iterations = 0;
        while iterations < self.iterations && !stop.is_cancelled() {
            self.send_once();
            iterations += 1;
        }
        let report = self.report(iterations, start.elapsed());
        report.throughput.log();
        if report.unsent > 0 || report.alloc_failures > 0 {
            log::info!(
                "unsent {} buffers, {} short bursts",
                report.unsent,
                report.alloc_failures
            );
        }
        report
    }

    fn report(&self, iterations: u64, elapsed: Duration) -> SenderReport {
        let (packets, bytes) = self
            .sampler
            .finish(Instant::now())
            .map_or((0, 0), |total| (total.total_packets, total.total_bytes));
        SenderReport {
            iterations,
            unsent: self.unsent,
            alloc_failures: self.alloc_failures,
            throughput: ThroughputReport {
                direction: Direction::Tx,
                elapsed,
                nic: self.port.stats().since(&self.baseline),
                packets,
                bytes,
            },
        }
    }
}
