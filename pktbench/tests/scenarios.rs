//
// scenarios.rs - Worker and bootstrap behaviour against controlled ports
//
// Each test drives a worker one iteration at a time, against either a mock port
// with a fixed acceptance limit or one end of a virtual link, and checks the
// pool accounting after every step: whatever a worker takes from a pool must be
// back there, or visibly parked in a port or ring, when the iteration ends.
//

use burst_io::{
    Buffer, BufferPool, CounterMessage, MacAddr, MessageError, PoolConfig, Port, PortConfig,
    PortStats, SetupError, VirtualNic, VirtualPort, channel,
};
use pktbench::config::{MESSAGE_POOL_NAME, MSG_POOL_SIZE, NUM_MBUFS, PACKET_POOL_NAME};
use pktbench::{
    BenchConfig, ReceiverState, ReceiverWorker, RelayConfig, RelayConsumer, RelayProducer,
    Runtime, SenderWorker, StopSignal,
};

fn pool(name: &str, capacity: usize, slot_size: usize, cache_size: usize) -> BufferPool {
    BufferPool::new(
        PoolConfig::new(name, capacity, slot_size)
            .with_cache_size(cache_size)
            .with_huge_page(Some(false)),
    )
    .unwrap()
}

fn assert_conserved(pool: &BufferPool) {
    assert_eq!(pool.free_count() + pool.checked_out(), pool.capacity());
}

/// Transmit side that takes at most `accept` buffers per call and keeps them.
struct CappedPort {
    accept: usize,
    accepted: Vec<Buffer>,
    stats: PortStats,
}

impl CappedPort {
    fn new(accept: usize) -> Self {
        CappedPort {
            accept,
            accepted: Vec::new(),
            stats: PortStats::default(),
        }
    }
}

impl Port for CappedPort {
    fn id(&self) -> u16 {
        7
    }

    fn mac_addr(&self) -> MacAddr {
        [0x02, 0, 0, 0, 0, 0x07]
    }

    fn receive_burst(&mut self, _out: &mut Vec<Buffer>, _max_n: usize) -> usize {
        0
    }

    fn transmit_burst(&mut self, bufs: &mut Vec<Buffer>) -> usize {
        let count = self.accept.min(bufs.len());
        for buf in bufs.drain(..count) {
            self.stats.opackets += 1;
            self.stats.obytes += buf.len() as u64;
            self.accepted.push(buf);
        }
        count
    }

    fn stats(&self) -> PortStats {
        self.stats
    }
}

fn started_pair(config: PortConfig) -> (VirtualPort, VirtualPort, BufferPool, BufferPool) {
    let (mut a, mut b) = VirtualPort::pair(64).unwrap();
    let pool_a = pool("a", 256, 2048, 0);
    let pool_b = pool("b", 256, 2048, 0);
    a.configure(config, pool_a.clone()).unwrap();
    b.configure(config, pool_b.clone()).unwrap();
    (a, b, pool_a, pool_b)
}

#[test]
fn partial_send_releases_the_rest() {
    let pool = pool("partial", 64, 2048, 8);
    let mut sender = SenderWorker::new(CappedPort::new(20), &pool, 32, 64, 1, 24).unwrap();

    assert_eq!(sender.send_once(), 20);
    assert_eq!(sender.sent(), 20);
    assert_eq!(sender.unsent(), 12);
    assert_eq!(pool.checked_out(), 20);
    assert_conserved(&pool);

    let port = sender.into_port();
    assert_eq!(port.stats().opackets, 20);
    assert_eq!(port.stats().obytes, 20 * 64);
    assert!(port.accepted.iter().all(|b| b.as_slice()[63] == 63));
    drop(port);
    assert_eq!(pool.free_count(), 64);
}

#[test]
fn sender_payload_counts_up() {
    let pool = pool("payload", 8, 2048, 0);
    let mut sender = SenderWorker::new(CappedPort::new(1), &pool, 1, 300, 1, 24).unwrap();
    assert_eq!(sender.send_once(), 1);
    let port = sender.into_port();
    let frame = port.accepted[0].as_slice();
    assert_eq!(frame.len(), 300);
    assert!(frame.iter().enumerate().all(|(i, b)| *b == (i % 256) as u8));
}

#[test]
fn sender_survives_pool_exhaustion() {
    let pool = pool("tiny", 10, 2048, 0);
    let mut sender = SenderWorker::new(CappedPort::new(32), &pool, 32, 64, 3, 24).unwrap();
    // The port keeps everything, so the pool runs dry during the first burst.
    assert_eq!(sender.send_once(), 10);
    assert_eq!(sender.send_once(), 0);
    assert_eq!(sender.alloc_failures(), 2);
    assert_eq!(pool.checked_out(), 10);
}

#[test]
fn empty_port_keeps_receiver_idle() {
    let (_a, b, _pool_a, pool_b) = started_pair(PortConfig::default());
    let mut receiver = ReceiverWorker::new(b, 32, 4).unwrap();
    for _ in 0..1000 {
        let outcome = receiver.poll_once();
        assert_eq!(outcome.received, 0);
        assert!(outcome.report.is_none());
    }
    assert_eq!(receiver.polls(), 1000);
    assert_eq!(receiver.packets(), 0);
    assert_eq!(receiver.state(), ReceiverState::Idle);
    assert!(receiver.started_at().is_none());
    assert!(receiver.report().elapsed.is_none());
    assert_eq!(pool_b.checked_out(), 0);
}

#[test]
fn receiver_counts_and_releases() {
    let (a, b, pool_a, pool_b) = started_pair(PortConfig::default());
    let mut sender = SenderWorker::new(a, &pool_a, 8, 64, 4, 24).unwrap();
    let mut receiver = ReceiverWorker::new(b, 32, 4).unwrap();

    for _ in 0..4 {
        assert_eq!(sender.send_once(), 8);
    }
    let first = receiver.poll_once();
    assert_eq!(first.received, 32);
    assert_eq!(first.bytes, 32 * 64);
    assert_eq!(receiver.state(), ReceiverState::Steady);
    let report = first.report.unwrap();
    assert_eq!(report.packets, 32);
    assert_eq!(report.nic.ipackets, 32);
    assert_eq!(report.nic_bytes(), report.bytes);

    assert_eq!(pool_a.checked_out(), 0);
    assert_eq!(pool_b.checked_out(), 0);
    assert_eq!(receiver.report().nic.ibytes, 32 * 64);
}

#[test]
fn receiver_arms_once_on_first_burst() {
    let (a, b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let mut sender = SenderWorker::new(a, &pool_a, 4, 64, 2, 24).unwrap();
    let mut receiver = ReceiverWorker::new(b, 32, 24).unwrap();

    assert_eq!(receiver.poll_once().received, 0);
    assert_eq!(receiver.state(), ReceiverState::Idle);
    sender.send_once();
    assert_eq!(receiver.poll_once().received, 4);
    assert_eq!(receiver.state(), ReceiverState::Steady);
    let armed_at = receiver.started_at().unwrap();

    sender.send_once();
    assert_eq!(receiver.poll_once().received, 4);
    assert_eq!(receiver.started_at(), Some(armed_at));
}

#[test]
fn sender_run_honours_budget_and_stop() {
    let (a, _b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let mut sender = SenderWorker::new(a, &pool_a, 4, 64, 10, 24).unwrap();
    let report = sender.run(&StopSignal::new());
    assert_eq!(report.iterations, 10);
    assert_eq!(report.throughput.packets, 40);
    assert_eq!(report.throughput.nic.opackets, 40);
    assert_eq!(report.throughput.bytes, 40 * 64);

    let stop = StopSignal::new();
    stop.cancel();
    assert!(stop.is_cancelled());
    let stopped = sender.run(&stop);
    assert_eq!(stopped.iterations, 0);
    // Totals are cumulative over the worker's lifetime.
    assert_eq!(stopped.throughput.packets, 40);
    assert_eq!(stopped.throughput.bytes, 40 * 64);
}

#[test]
fn idle_sender_reports_nothing_sent() {
    let (a, _b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let mut sender = SenderWorker::new(a, &pool_a, 4, 64, 10, 24).unwrap();
    let stop = StopSignal::new();
    stop.cancel();
    let report = sender.run(&stop);
    assert_eq!(report.throughput.packets, 0);
    assert_eq!(report.throughput.bytes, 0);
    assert_eq!(report.throughput.nic.opackets, 0);
}

#[test]
fn ether_header_passes_mac_filter() {
    let config = PortConfig {
        promiscuous: false,
        ..PortConfig::default()
    };
    let (a, b, pool_a, _pool_b) = started_pair(config);
    let dst = b.mac_addr();
    let mut addressed = SenderWorker::new(a, &pool_a, 4, 64, 1, 24)
        .unwrap()
        .with_ether_header(dst)
        .unwrap();
    assert_eq!(addressed.frame_len(), 76);
    assert_eq!(addressed.send_once(), 4);

    let mut receiver = ReceiverWorker::new(b, 32, 24).unwrap();
    assert_eq!(receiver.poll_once().received, 4);
    assert_eq!(receiver.report().nic.imissed, 0);
}

#[test]
fn full_relay_ring_drops_without_leaking() {
    let (a, b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let messages = pool("msgs", 16, 64, 0);
    let (tx, rx) = channel(2).unwrap();
    let mut sender = SenderWorker::new(a, &pool_a, 1, 64, 5, 24).unwrap();
    let receiver = ReceiverWorker::new(b, 32, 24).unwrap();
    let mut producer = RelayProducer::new(receiver, &messages, tx).unwrap();

    for _ in 0..5 {
        assert_eq!(sender.send_once(), 1);
        assert_eq!(producer.poll_once().received, 1);
        assert_conserved(&messages);
    }
    let stats = producer.stats();
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.dropped_full, 3);
    assert_eq!(messages.checked_out(), 2);

    let mut consumer = RelayConsumer::new(rx, &messages, Default::default());
    assert_eq!(consumer.try_consume(), Some(Ok(CounterMessage::new(1, 1))));
    assert_eq!(consumer.try_consume(), Some(Ok(CounterMessage::new(2, 1))));
    assert_eq!(consumer.try_consume(), None);
    assert_eq!(consumer.report().consumed, 2);
    assert_eq!(messages.checked_out(), 0);
    assert_eq!(messages.free_count(), 16);
}

#[test]
fn single_slot_relay_ring_drops_without_leaking() {
    let (a, b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let messages = pool("single", 8, 64, 0);
    let (tx, rx) = channel(1).unwrap();
    let mut sender = SenderWorker::new(a, &pool_a, 1, 64, 3, 24).unwrap();
    let receiver = ReceiverWorker::new(b, 32, 24).unwrap();
    let mut producer = RelayProducer::new(receiver, &messages, tx).unwrap();

    for _ in 0..3 {
        assert_eq!(sender.send_once(), 1);
        assert_eq!(producer.poll_once().received, 1);
        assert_conserved(&messages);
    }
    assert_eq!(producer.stats().sent, 1);
    assert_eq!(producer.stats().dropped_full, 2);
    assert_eq!(messages.checked_out(), 1);

    let mut consumer = RelayConsumer::new(rx, &messages, Default::default());
    assert_eq!(consumer.try_consume(), Some(Ok(CounterMessage::new(1, 1))));
    assert_eq!(consumer.try_consume(), None);
    assert_eq!(messages.checked_out(), 0);
}

#[test]
fn empty_message_pool_drops_the_message() {
    let (a, b, pool_a, _pool_b) = started_pair(PortConfig::default());
    let messages = pool("one", 1, 64, 0);
    let (tx, _rx) = channel(4).unwrap();
    let mut sender = SenderWorker::new(a, &pool_a, 2, 64, 2, 24).unwrap();
    let mut producer =
        RelayProducer::new(ReceiverWorker::new(b, 32, 24).unwrap(), &messages, tx).unwrap();

    sender.send_once();
    producer.poll_once();
    sender.send_once();
    producer.poll_once();
    assert_eq!(producer.stats().sent, 1);
    assert_eq!(producer.stats().dropped_no_buffer, 1);
    assert_eq!(producer.receiver().packets(), 4);
}

#[test]
fn consumer_counts_malformed_messages() {
    let messages = pool("bad", 4, 64, 0);
    let (tx, rx) = channel(4).unwrap();
    let mut junk = messages.acquire().unwrap();
    junk.append(&[0xff; 12]).unwrap();
    tx.try_send(junk).unwrap();

    let mut consumer = RelayConsumer::new(rx, &messages, Default::default());
    assert_eq!(
        consumer.try_consume(),
        Some(Err(MessageError::BadLength(0xffff)))
    );
    assert_eq!(consumer.report().malformed, 1);
    assert_eq!(messages.free_count(), 4);
}

#[test]
fn relay_rejects_undersized_message_slots() {
    let (_a, b) = VirtualPort::pair(4).unwrap();
    let small = pool("small", 4, 8, 0);
    let (tx, _rx) = channel(4).unwrap();
    let receiver = ReceiverWorker::new(b, 32, 24).unwrap();
    assert!(matches!(
        RelayProducer::new(receiver, &small, tx),
        Err(SetupError::Config(_))
    ));
}

fn small_config() -> BenchConfig {
    BenchConfig {
        huge_pages: Some(false),
        ..BenchConfig::default()
    }
}

#[test]
fn bootstrap_needs_exactly_one_port() {
    let none = Runtime::bootstrap(small_config(), VirtualNic::new());
    assert!(matches!(none, Err(SetupError::PortCount(0))));

    let (a, b) = VirtualPort::pair(4).unwrap();
    let two = Runtime::bootstrap(small_config(), VirtualNic::new().with_port(a).with_port(b));
    let err = two.err().unwrap();
    assert!(matches!(err, SetupError::PortCount(2)));
    assert_eq!(err.to_string(), "there must be exactly one port, found 2");
}

#[test]
fn bootstrap_rejects_bad_port_config() {
    let mut config = small_config();
    config.port.tx_queues = 4;
    let (a, _b) = VirtualPort::pair(4).unwrap();
    let res = Runtime::bootstrap(config, VirtualNic::new().with_port(a.with_id(3)));
    assert!(matches!(res, Err(SetupError::PortConfig { port: 3, .. })));
}

#[test]
fn bootstrap_rejects_bad_bench_config() {
    let mut config = small_config().with_relay(RelayConfig {
        ring_size: 48,
        ..RelayConfig::default()
    });
    let (a, _b) = VirtualPort::pair(4).unwrap();
    let res = Runtime::bootstrap(config.clone(), VirtualNic::new().with_port(a));
    assert!(matches!(res, Err(SetupError::Config(_))));

    config.relay = None;
    config.burst_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn bootstrap_builds_pools_and_starts_port() {
    let (a, _b) = VirtualPort::pair(4).unwrap();
    let config = small_config().with_relay(RelayConfig::default());
    let runtime = Runtime::bootstrap(config, VirtualNic::new().with_port(a)).unwrap();
    assert_eq!(runtime.pool().name(), PACKET_POOL_NAME);
    assert_eq!(runtime.pool().capacity(), NUM_MBUFS);
    assert!(runtime.port().is_started());

    let relay = runtime.relay().unwrap();
    assert_eq!(relay.pool.name(), MESSAGE_POOL_NAME);
    assert_eq!(relay.pool.capacity(), MSG_POOL_SIZE);
    assert_eq!(relay.tx.ring().capacity(), 64);
}
