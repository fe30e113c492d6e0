use anyhow::Context as _;
use burst_io::{BackoffPolicy, MacAddr, Port as _, VirtualNic, VirtualPort};
use clap::{Parser, Subcommand};
use pktbench::config::{
    BURST_SIZE, PAYLOAD_LEN, SAMPLE_WINDOW_LOG2, SENDER_ITERATIONS, TX_RING_SIZE,
};
use pktbench::{
    BenchConfig, ReceiverWorker, RelayConfig, RelayConsumer, RelayProducer, Runtime,
    SenderWorker, StopSignal, check_core_budget, pin_current_thread,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Packets per burst
    #[clap(short, long, default_value_t = BURST_SIZE)]
    burst: usize,

    /// Log a throughput report every 2^N packets
    #[clap(long, default_value_t = SAMPLE_WINDOW_LOG2)]
    window_log2: u32,

    /// Relay consumer backoff: none, fixed:5us or exp:1us..1ms
    #[clap(long, default_value_t = BackoffPolicy::default())]
    backoff: BackoffPolicy,

    /// Core for the measured worker
    #[clap(long)]
    core: Option<usize>,

    /// Core for the traffic peer
    #[clap(long)]
    peer_core: Option<usize>,

    /// Core for the relay consumer
    #[clap(long)]
    consumer_core: Option<usize>,

    /// MAC address of the measured port, like 02:00:00:00:00:01
    #[clap(long)]
    mac: Option<String>,

    /// Force huge pages on or off (default: use them if available)
    #[clap(long)]
    huge_pages: Option<bool>,

    /// Frames in flight on each direction of the virtual link
    #[clap(long, default_value_t = TX_RING_SIZE)]
    wire_depth: usize,

    /// Accept only frames addressed to the port
    #[clap(long)]
    no_promiscuous: bool,

    /// Stop after this long, like 10s or 500ms (default: run until Ctrl-C)
    #[clap(short, long)]
    duration: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Send bursts to a receiving peer and report TX throughput
    Send {
        /// Number of bursts to send
        #[clap(short = 'n', long, default_value_t = SENDER_ITERATIONS)]
        iterations: u64,

        /// Payload bytes per packet
        #[clap(short, long, default_value_t = PAYLOAD_LEN)]
        payload: usize,
    },
    /// Receive from a sending peer until stopped
    Receive,
    /// Receive and pass a counter message per burst to a consumer worker
    Relay,
}

fn spawn_worker<T, F>(name: &'static str, core: Option<usize>, f: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        if let Some(core) = core {
            pin_current_thread(core);
        }
        log::debug!("{name} worker running");
        f()
    })
}

fn parse_mac(text: &str) -> anyhow::Result<MacAddr> {
    let mac = eui48::MacAddress::parse_str(text)
        .map_err(|e| anyhow::anyhow!("invalid MAC address {text}: {e}"))?;
    Ok(mac.to_array())
}

/// Builds both ends of the link: the measured host and its traffic peer.
fn bootstrap(args: &Args, config: &BenchConfig) -> anyhow::Result<(Runtime, Runtime)> {
    let (mut local, peer) = VirtualPort::pair(args.wire_depth)?;
    if let Some(mac) = &args.mac {
        local = local.with_mac(parse_mac(mac)?);
    }
    let local = Runtime::bootstrap(config.clone(), VirtualNic::new().with_port(local))
        .context("cannot bootstrap the measured host")?;
    let peer_config = BenchConfig {
        relay: None,
        ..config.clone()
    };
    let peer = Runtime::bootstrap(peer_config, VirtualNic::new().with_port(peer.with_id(1)))
        .context("cannot bootstrap the peer host")?;
    Ok((local, peer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let duration = args
        .duration
        .as_deref()
        .map(humantime::parse_duration)
        .transpose()
        .context("invalid duration")?;

    let mut config = BenchConfig {
        burst_size: args.burst,
        sample_window_log2: args.window_log2,
        backoff: args.backoff,
        huge_pages: args.huge_pages,
        ..BenchConfig::default()
    };
    config.port.promiscuous = !args.no_promiscuous;
    let roles = match &args.mode {
        Mode::Send {
            iterations,
            payload,
        } => {
            config.sender_iterations = *iterations;
            config.payload_len = *payload;
            2
        }
        Mode::Receive => 2,
        Mode::Relay => {
            config = config.with_relay(RelayConfig::default());
            3
        }
    };
    let assigned = [args.core, args.peer_core, args.consumer_core]
        .iter()
        .flatten()
        .count();
    check_core_budget(assigned, roles);

    let (local, peer) = bootstrap(&args, &config)?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, stopping workers");
            interrupt.cancel();
        }
    });
    if let Some(duration) = duration {
        let deadline = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            deadline.cancel();
        });
    }
    let stop = StopSignal::follow(&token);

    match args.mode {
        Mode::Send { .. } => run_send(local, peer, &args, stop).await,
        Mode::Receive => run_receive(local, peer, &args, stop).await,
        Mode::Relay => run_relay(local, peer, &args, stop).await,
    }
}

/// Peer that floods the measured host until stopped.
fn peer_sender(peer: Runtime, dst: MacAddr) -> anyhow::Result<SenderWorker<VirtualPort>> {
    let (config, port, pool, _) = peer.into_parts();
    let sender = SenderWorker::new(
        port,
        &pool,
        config.burst_size,
        config.payload_len,
        u64::MAX,
        config.sample_window_log2,
    )?;
    Ok(if config.port.promiscuous {
        sender
    } else {
        sender.with_ether_header(dst)?
    })
}

async fn run_send(local: Runtime, peer: Runtime, args: &Args, stop: StopSignal) -> anyhow::Result<()> {
    let peer_mac = peer.port().mac_addr();
    let (config, port, pool, _) = local.into_parts();
    let mut sender = SenderWorker::new(
        port,
        &pool,
        config.burst_size,
        config.payload_len,
        config.sender_iterations,
        config.sample_window_log2,
    )?;
    if !config.port.promiscuous {
        sender = sender.with_ether_header(peer_mac)?;
    }
    let (_, peer_port, _, _) = peer.into_parts();
    let mut sink = ReceiverWorker::new(peer_port, config.burst_size, config.sample_window_log2)?;

    let sink_stop = stop.clone();
    let sink = spawn_worker("sink", args.peer_core, move || sink.run(&sink_stop));
    let sender_stop = stop.clone();
    let report = spawn_worker("sender", args.core, move || sender.run(&sender_stop))
        .await
        .context("sender worker failed")?;
    stop.cancel();
    let received = sink.await.context("sink worker failed")?;
    log::info!(
        "sent {} packets in {} bursts, peer received {}",
        report.throughput.packets,
        report.iterations,
        received.packets
    );
    Ok(())
}

async fn run_receive(local: Runtime, peer: Runtime, args: &Args, stop: StopSignal) -> anyhow::Result<()> {
    let local_mac = local.port().mac_addr();
    let (config, port, _, _) = local.into_parts();
    let mut receiver = ReceiverWorker::new(port, config.burst_size, config.sample_window_log2)?;
    let mut traffic = peer_sender(peer, local_mac)?;

    let peer_stop = stop.clone();
    let traffic = spawn_worker("traffic", args.peer_core, move || traffic.run(&peer_stop));
    let receiver_stop = stop.clone();
    let report = spawn_worker("receiver", args.core, move || receiver.run(&receiver_stop))
        .await
        .context("receiver worker failed")?;
    traffic.await.context("traffic worker failed")?;
    if let Some(elapsed) = report.elapsed {
        log::info!(
            "received {} packets, {} bytes in {:.3} s",
            report.packets,
            report.bytes,
            elapsed.as_secs_f64()
        );
    } else {
        log::info!("no packets received");
    }
    Ok(())
}

async fn run_relay(local: Runtime, peer: Runtime, args: &Args, stop: StopSignal) -> anyhow::Result<()> {
    let local_mac = local.port().mac_addr();
    let (config, port, _, relay) = local.into_parts();
    let relay = relay.context("relay channels were not created")?;
    let receiver = ReceiverWorker::new(port, config.burst_size, config.sample_window_log2)?;
    let mut producer = RelayProducer::new(receiver, &relay.pool, relay.tx)?;
    let mut consumer = RelayConsumer::new(relay.rx, &relay.pool, config.backoff);
    let mut traffic = peer_sender(peer, local_mac)?;

    let peer_stop = stop.clone();
    let traffic = spawn_worker("traffic", args.peer_core, move || traffic.run(&peer_stop));
    let consumer_stop = stop.clone();
    let consumer = spawn_worker("consumer", args.consumer_core, move || {
        consumer.run(&consumer_stop)
    });
    let producer_stop = stop.clone();
    let (received, relayed) =
        spawn_worker("producer", args.core, move || producer.run(&producer_stop))
            .await
            .context("relay producer failed")?;
    let consumed = consumer.await.context("relay consumer failed")?;
    traffic.await.context("traffic worker failed")?;
    log::info!(
        "relayed {} of {} bursts ({} packets), consumer took {}",
        relayed.sent,
        relayed.sent + relayed.dropped_full + relayed.dropped_no_buffer,
        received.packets,
        consumed.consumed
    );
    Ok(())
}
