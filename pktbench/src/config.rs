//! Benchmark parameters.
//!
//! Defaults reproduce the classic poll-mode benchmark setup: an 8191-buffer
//! packet pool, 32-packet bursts of 64-byte payloads, a throughput report every
//! 2^24 packets and, for the relay variant, a 64-entry message ring fed from a
//! 1024-message pool.

use burst_io::{BackoffPolicy, MESSAGE_LEN, PortConfig, SetupError};

pub const RX_RING_SIZE: usize = 128;
pub const TX_RING_SIZE: usize = 512;

pub const NUM_MBUFS: usize = 8191;
pub const MBUF_CACHE_SIZE: usize = 250;
pub const MBUF_SLOT_SIZE: usize = 2048;

pub const BURST_SIZE: usize = 32;
pub const PAYLOAD_LEN: usize = 64;
pub const MAX_FRAME_LEN: usize = 1518;

pub const SAMPLE_WINDOW_LOG2: u32 = 24;
pub const SENDER_ITERATIONS: u64 = 1 << 20;

pub const MSG_RING_SIZE: usize = 64;
pub const MSG_POOL_SIZE: usize = 1024;
pub const MSG_SIZE: usize = 64;
pub const MSG_POOL_CACHE: usize = 32;

pub const PACKET_POOL_NAME: &str = "MBUF_POOL";
pub const MESSAGE_POOL_NAME: &str = "MSG_POOL";

/// Sizing of the relay path between the producer and consumer workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub ring_size: usize,
    pub pool_size: usize,
    pub msg_size: usize,
    pub pool_cache: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            ring_size: MSG_RING_SIZE,
            pool_size: MSG_POOL_SIZE,
            msg_size: MSG_SIZE,
            pool_cache: MSG_POOL_CACHE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub burst_size: usize,
    pub payload_len: usize,
    /// A throughput report is logged every `2^sample_window_log2` packets.
    pub sample_window_log2: u32,
    /// Bursts the sender transmits before reporting and returning.
    pub sender_iterations: u64,
    /// Back-off of the relay consumer when its ring is empty.
    pub backoff: BackoffPolicy,
    pub num_mbufs: usize,
    pub mbuf_cache_size: usize,
    pub mbuf_slot_size: usize,
    /// `None` lets the arena pick huge pages when the system has free ones.
    pub huge_pages: Option<bool>,
    pub port: PortConfig,
    /// Present when the relay variant runs.
    pub relay: Option<RelayConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            burst_size: BURST_SIZE,
            payload_len: PAYLOAD_LEN,
            sample_window_log2: SAMPLE_WINDOW_LOG2,
            sender_iterations: SENDER_ITERATIONS,
            backoff: BackoffPolicy::default(),
            num_mbufs: NUM_MBUFS,
            mbuf_cache_size: MBUF_CACHE_SIZE,
            mbuf_slot_size: MBUF_SLOT_SIZE,
            huge_pages: None,
            port: PortConfig {
                rx_ring_size: RX_RING_SIZE,
                tx_ring_size: TX_RING_SIZE,
                max_frame_len: MAX_FRAME_LEN,
                ..PortConfig::default()
            },
            relay: None,
        }
    }
}

impl BenchConfig {
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn sample_window(&self) -> u64 {
        1u64.checked_shl(self.sample_window_log2).unwrap_or(0)
    }

    /// Rejects combinations the workers cannot run with.
    pub fn validate(&self) -> Result<(), SetupError> {
        let fail = |reason: String| Err(SetupError::Config(reason));
        if self.burst_size == 0 || self.burst_size > u16::MAX as usize {
            return fail(format!("burst size {} out of range", self.burst_size));
        }
        if self.payload_len == 0
            || self.payload_len > self.mbuf_slot_size
            || self.payload_len > self.port.max_frame_len
        {
            return fail(format!(
                "payload length {} must fit in a {} byte slot and a {} byte frame",
                self.payload_len, self.mbuf_slot_size, self.port.max_frame_len
            ));
        }
        if self.sample_window_log2 >= u64::BITS {
            return fail(format!(
                "sampling window 2^{} is out of range",
                self.sample_window_log2
            ));
        }
        if self.burst_size > self.num_mbufs {
            return fail(format!(
                "burst size {} exceeds the packet pool of {}",
                self.burst_size, self.num_mbufs
            ));
        }
        if let Some(relay) = &self.relay {
            if relay.msg_size < MESSAGE_LEN {
                return fail(format!(
                    "message slots of {} bytes cannot hold a {MESSAGE_LEN} byte record",
                    relay.msg_size
                ));
            }
            if !relay.ring_size.is_power_of_two() {
                return fail(format!(
                    "relay ring size {} is not a power of two",
                    relay.ring_size
                ));
            }
        }
        Ok(())
    }
}
