//! # Runtime Bootstrap
//!
//! ## Purpose
//!
//! Everything a worker needs is built here, once, before any polling starts:
//! the packet pool, the configured port and, for the relay variant, the message
//! pool and ring. The result is an explicit context handed to the workers by
//! value, so nothing lives in process-wide state.
//!
//! ## How it works
//!
//! `Runtime::bootstrap` insists on a NIC with exactly one port, creates the packet
//! pool, configures and starts the port against it and logs the port's MAC.
//! Every failure is a `SetupError` and aborts the run.
//!
//! ## Main components
//!
//! - `Runtime`: The bootstrapped context.
//! - `RelayChannels`: Message pool plus both ends of the relay ring.
//! - `pin_current_thread()`: Binds the calling thread to a core.

use crate::config::{BenchConfig, MESSAGE_POOL_NAME, PACKET_POOL_NAME, RelayConfig};
use burst_io::{
    Buffer, BufferPool, MacDisplay, PoolConfig, Port as _, Receiver, Sender, SetupError,
    StatsHandle, VirtualNic, VirtualPort, channel,
};

/// The relay path: producer and consumer share the message pool and one ring.
pub struct RelayChannels {
    pub pool: BufferPool,
    pub tx: Sender<Buffer>,
    pub rx: Receiver<Buffer>,
}

impl RelayChannels {
    pub fn new(config: &RelayConfig, huge_pages: Option<bool>) -> Result<Self, SetupError> {
        let pool = BufferPool::new(
            PoolConfig::new(MESSAGE_POOL_NAME, config.pool_size, config.msg_size)
                .with_cache_size(config.pool_cache)
                .with_huge_page(huge_pages),
        )?;
        let (tx, rx) = channel(config.ring_size)?;
        Ok(RelayChannels { pool, tx, rx })
    }
}

pub struct Runtime {
    config: BenchConfig,
    port: VirtualPort,
    pool: BufferPool,
    relay: Option<RelayChannels>,
}

impl Runtime {
    /// Builds pools, configures the single port and prepares the relay path if enabled.
    pub fn bootstrap(config: BenchConfig, nic: VirtualNic) -> Result<Runtime, SetupError> {
        config.validate()?;
        if nic.port_count() != 1 {
            return Err(SetupError::PortCount(nic.port_count()));
        }
        let mut port = nic
            .into_ports()
            .pop()
            .ok_or(SetupError::PortCount(0))?;

        let pool = BufferPool::new(
            PoolConfig::new(PACKET_POOL_NAME, config.num_mbufs, config.mbuf_slot_size)
                .with_cache_size(config.mbuf_cache_size)
                .with_huge_page(config.huge_pages),
        )?;
        port.configure(config.port, pool.clone())?;
        log::info!(
            "Port {} MAC: {}",
            port.id(),
            MacDisplay(&port.mac_addr())
        );

        let relay = config
            .relay
            .as_ref()
            .map(|relay| RelayChannels::new(relay, config.huge_pages))
            .transpose()?;

        Ok(Runtime {
            config,
            port,
            pool,
            relay,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn port(&self) -> &VirtualPort {
        &self.port
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.port.stats_handle()
    }

    pub fn relay(&self) -> Option<&RelayChannels> {
        self.relay.as_ref()
    }

    /// Hands the parts over to the workers.
    pub fn into_parts(self) -> (BenchConfig, VirtualPort, BufferPool, Option<RelayChannels>) {
        (self.config, self.port, self.pool, self.relay)
    }
}

/// Pins the calling thread to `core`. Returns `false`, with a warning, if that is not possible.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        log::warn!("cannot enumerate cores, thread stays unpinned");
        return false;
    };
    let Some(id) = ids.into_iter().find(|id| id.id == core) else {
        log::warn!("core {core} is not available, thread stays unpinned");
        return false;
    };
    if !core_affinity::set_for_current(id) {
        log::warn!("failed to pin thread to core {core}");
        return false;
    }
    log::debug!("thread pinned to core {core}");
    true
}

/// Warns when more cores were assigned than the run has roles for.
pub fn check_core_budget(assigned: usize, roles: usize) {
    if assigned > roles {
        log::warn!("Too many cores assigned: {assigned} given, only {roles} used");
    }
}
