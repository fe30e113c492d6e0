use super::StopSignal;
use super::receiver::{PollOutcome, ReceiverReport, ReceiverWorker};
use burst_io::{
    Backoff, BackoffPolicy, Buffer, BufferPool, CounterMessage, MESSAGE_LEN, MessageError,
    PoolCache, Port, Receiver, Sender, SetupError, TrySendError,
};

/// Outcome counters of the producer side of the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub sent: u64,
    /// Messages dropped because the ring was full.
    pub dropped_full: u64,
    /// Messages never built because the message pool was empty.
    pub dropped_no_buffer: u64,
}

/// Receiver that announces every non-empty burst to a consumer through a ring.
pub struct RelayProducer<P: Port> {
    receiver: ReceiverWorker<P>,
    cache: PoolCache,
    tx: Sender<Buffer>,
    counter: u64,
    stats: RelayStats,
}

impl<P: Port> RelayProducer<P> {
    pub fn new(
        receiver: ReceiverWorker<P>,
        pool: &BufferPool,
        tx: Sender<Buffer>,
    ) -> Result<Self, SetupError> {
        if pool.slot_size() < MESSAGE_LEN {
            return Err(SetupError::Config(format!(
                "pool {} slots are smaller than a message",
                pool.name()
            )));
        }
        Ok(RelayProducer {
            receiver,
            cache: pool.cache(),
            tx,
            counter: 0,
            stats: RelayStats::default(),
        })
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn receiver(&self) -> &ReceiverWorker<P> {
        &self.receiver
    }

    pub fn poll_once(&mut self) -> PollOutcome {
        let outcome = self.receiver.poll_once();
        if outcome.received > 0 {
            self.counter += outcome.received as u64;
            // Bursts never exceed the configured burst size, which fits in u16.
            let burst = u16::try_from(outcome.received).unwrap_or(u16::MAX);
            self.publish(CounterMessage::new(self.counter, burst));
        }
        outcome
    }

    fn publish(&mut self, msg: CounterMessage) {
        let Some(mut buf) = self.cache.acquire() else {
            self.stats.dropped_no_buffer += 1;
            log::debug!(
                "message pool empty, {} messages dropped",
                self.stats.dropped_no_buffer
            );
            return;
        };
        let encoded =
            buf.set_len(MESSAGE_LEN).is_ok() && msg.encode_into(buf.as_mut_slice()).is_ok();
        if !encoded {
            log::error!("message does not fit a {} byte slot", buf.capacity());
            self.cache.release(buf);
            return;
        }
        match self.tx.try_send(buf) {
            Ok(()) => self.stats.sent += 1,
            Err(TrySendError::Full(buf)) => {
                self.cache.release(buf);
                self.stats.dropped_full += 1;
                log::debug!(
                    "relay ring full, {} messages dropped",
                    self.stats.dropped_full
                );
            }
        }
    }

    pub fn run(&mut self, stop: &StopSignal) -> (ReceiverReport, RelayStats) {
        log::info!("relay producer started");
        while !stop.is_cancelled() {
            self.poll_once();
        }
        let stats = self.stats;
        log::info!(
            "relay producer stopped: {} sent, {} dropped on full ring, {} dropped on empty pool",
            stats.sent,
            stats.dropped_full,
            stats.dropped_no_buffer
        );
        (self.receiver.report(), stats)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayConsumerReport {
    pub consumed: u64,
    pub malformed: u64,
    pub last: Option<CounterMessage>,
}

/// Drains the relay ring, logs each message and returns its buffer to the pool.
pub struct RelayConsumer {
    rx: Receiver<Buffer>,
    cache: PoolCache,
    backoff: Backoff,
    report: RelayConsumerReport,
}

impl RelayConsumer {
    pub fn new(rx: Receiver<Buffer>, pool: &BufferPool, backoff: BackoffPolicy) -> Self {
        RelayConsumer {
            rx,
            cache: pool.cache(),
            backoff: Backoff::new(backoff),
            report: RelayConsumerReport::default(),
        }
    }

    pub fn report(&self) -> RelayConsumerReport {
        self.report
    }

    /// Takes one message off the ring, or `None` if it is empty.
    pub fn try_consume(&mut self) -> Option<Result<CounterMessage, MessageError>> {
        let buf = self.rx.try_receive()?;
        let decoded = CounterMessage::decode(buf.as_slice());
        self.cache.release(buf);
        match decoded {
            Ok(msg) => {
                self.report.consumed += 1;
                self.report.last = Some(msg);
                log::info!("message: counter {} burst {}", msg.counter, msg.burst);
            }
            Err(e) => {
                self.report.malformed += 1;
                log::warn!("malformed message: {e}");
            }
        }
        Some(decoded)
    }

    /// Consumes until `stop` is cancelled, backing off while the ring is empty.
    pub fn run(&mut self, stop: &StopSignal) -> RelayConsumerReport {
        log::info!("relay consumer started, backoff {}", self.backoff.policy());
        while !stop.is_cancelled() {
            match self.try_consume() {
                Some(_) => self.backoff.reset(),
                None => self.backoff.snooze(),
            }
        }
        log::info!(
            "relay consumer stopped: {} consumed, {} malformed",
            self.report.consumed,
            self.report.malformed
        );
        self.report
    }
}
