use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use aquarium_sync::config::ClientConfig;
use aquarium_sync::metrics::SyncMetrics;
use aquarium_sync::net::adapter::{Clock, SystemClock, TransportAdapter, ViewSink, ViewUpdate, World};
use aquarium_sync::net::framing::{write_envelope, EnvelopeReader, FramingError};
use aquarium_sync::net::inbound_queue::{InboundQueue, InboundSender, QueueError};
use aquarium_sync::net::protocol::Envelope;
use aquarium_sync::world::scheduler::{Frame, RenderSink, UpdateScheduler};

/// Logs frames instead of drawing them
struct TraceRenderer;

impl RenderSink for TraceRenderer {
    fn paint(&mut self, frame: &Frame) {
        trace!(
            "Frame {} @ {}: {} entities, {} cursors",
            frame.frame_number,
            frame.now_ms,
            frame.entities.len(),
            frame.cursors.len()
        );
        for entity in &frame.entities {
            trace!(
                "  {} {} at ({:.1}, {:.1}) {:?} rot={:.3}",
                entity.kind,
                entity.id,
                entity.pose.position.x,
                entity.pose.position.y,
                entity.pose.facing,
                entity.pose.rotation
            );
        }
    }
}

/// Logs view updates
struct LogView;

impl ViewSink for LogView {
    fn update(&mut self, update: ViewUpdate) {
        match update {
            ViewUpdate::LocalUser { money, .. } => match money {
                Some(money) => info!("Balance: ${:.2}", money),
                None => info!("User info updated"),
            },
            ViewUpdate::RemoteUser { username, .. } => debug!("{} updated", username),
            ViewUpdate::UserJoined(_) | ViewUpdate::UserLeft(_) => {}
            ViewUpdate::Chat(message) => info!("Chat: {}", message),
            ViewUpdate::StoreSummary(items) => debug!("Store summary: {}", items),
        }
    }
}

/// Frame loop state
struct Client {
    queue: InboundQueue,
    world: World,
    adapter: TransportAdapter,
    scheduler: UpdateScheduler,
    outbound: mpsc::UnboundedSender<Envelope>,
    metrics: Arc<SyncMetrics>,
    summary_every_frames: u64,
    renderer: TraceRenderer,
    view: LogView,
}

impl Client {
    /// Apply everything queued, then render one frame
    fn frame(&mut self, now_ms: u64) {
        for envelope in self.queue.drain() {
            self.adapter
                .handle(envelope, &mut self.world, now_ms, &mut self.outbound, &mut self.view);
        }

        self.scheduler.set_pointer(self.adapter.pointer());
        let elapsed = self.scheduler.tick(
            &self.world.entities,
            &mut self.world.cursors,
            now_ms,
            &mut self.renderer,
        );
        self.metrics.record_frame_time(elapsed);

        if self.scheduler.frame_number() % self.summary_every_frames == 0 {
            self.log_summary();
        }
    }

    fn log_summary(&self) {
        info!(
            "Frame {}: {} entities, {} cursors, queue {}/{}, budget {:.1}%",
            self.scheduler.frame_number(),
            self.world.entities.len(),
            self.world.cursors.len(),
            self.queue.pending_count(),
            self.queue.capacity(),
            self.metrics.budget_ratio(self.scheduler.frame_interval()) * 100.0
        );
        debug!("\n{}", self.metrics.render());
    }
}

/// How long shutdown waits for blocking reads before abandoning them
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Read envelopes until end of input, handing each to the frame loop.
///
/// With `pace` (replay), hands over one envelope per frame: each waits until
/// the frame loop has drained the previous one. Without it, a full queue
/// drops the newest envelope.
async fn read_envelopes<R: AsyncBufRead + Unpin>(
    input: R,
    max_line_bytes: usize,
    sender: InboundSender,
    metrics: Arc<SyncMetrics>,
    pace: Option<Duration>,
) -> Result<u64, FramingError> {
    let mut reader = EnvelopeReader::new(input, max_line_bytes);
    let mut count = 0;

    loop {
        let envelope = match reader.next_envelope().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(count),
            Err(e) if e.is_recoverable() => {
                warn!("Skipping input line: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        count += 1;

        if let Some(pace) = pace {
            while !sender.is_empty() {
                tokio::time::sleep(pace).await;
            }
        }

        match sender.try_send(envelope) {
            Ok(()) => {}
            Err(QueueError::Full) => SyncMetrics::incr(&metrics.inbound_dropped),
            Err(QueueError::Disconnected) => return Ok(count),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Stdout carries outbound envelopes, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Aquarium Sync v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load_or_default();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: user={}, {} fps, queue={}",
        config.username, config.frame_rate, config.inbound_capacity
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(config));
    shut_down(runtime);
    result
}

/// Stop the runtime without waiting on a stdin read parked in the blocking
/// pool; that read only returns once another line arrives.
fn shut_down(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let session = config.session();
    let metrics = Arc::new(SyncMetrics::new());
    let queue = InboundQueue::new(config.inbound_capacity);
    let scheduler = UpdateScheduler::new(config.frame_rate);

    let (input, pace): (Box<dyn AsyncBufRead + Unpin + Send>, Option<Duration>) =
        match &config.replay_path {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening replay {}", path.display()))?;
                info!("Replaying {}", path.display());
                (Box::new(BufReader::new(file)), Some(scheduler.frame_interval()))
            }
            None => (Box::new(BufReader::new(tokio::io::stdin())), None),
        };

    let mut reader_task = tokio::spawn(read_envelopes(
        input,
        config.max_line_bytes,
        queue.sender(),
        metrics.clone(),
        pace,
    ));

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    let writer_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = write_envelope(&mut stdout, &envelope).await {
                error!("Outbound write failed: {}", e);
                break;
            }
        }
    });

    let mut interval = tokio::time::interval(scheduler.frame_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut client = Client {
        queue,
        world: World::new(session, config.action_duration_ms),
        adapter: TransportAdapter::new(metrics.clone()),
        scheduler,
        outbound,
        metrics: metrics.clone(),
        summary_every_frames: config.summary_every_frames,
        renderer: TraceRenderer,
        view: LogView,
    };
    let clock = SystemClock;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => client.frame(clock.now_ms()),
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Ctrl+C handler failed: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
            result = &mut reader_task => {
                match result {
                    Ok(Ok(count)) => info!("End of input after {} envelopes", count),
                    Ok(Err(e)) => error!("Input failed: {}", e),
                    Err(e) => error!("Reader task failed: {}", e),
                }
                break;
            }
        }
    }

    reader_task.abort();
    client.frame(clock.now_ms());
    client.log_summary();

    // Closing the channel lets the writer flush and exit
    drop(client);
    if let Err(e) = writer_task.await {
        error!("Writer task failed: {}", e);
    }

    info!("Client stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const REPLAY: &[u8] = b"{\"channel\":\"aquarium\",\"event\":\"update_thing\",\"data\":{\"id\":\"a\"}}
{\"channel\":\"aquarium\",\"event\":\"update_thing\",\"data\":{\"id\":\"b\"}}
{\"channel\":\"aquarium\",\"event\":\"update_thing\",\"data\":{\"id\":\"c\"}}
";

    #[tokio::test]
    async fn test_replay_hands_over_one_envelope_per_frame() {
        let queue = InboundQueue::new(16);
        let metrics = Arc::new(SyncMetrics::new());
        let reader = tokio::spawn(read_envelopes(
            REPLAY,
            1024,
            queue.sender(),
            metrics.clone(),
            Some(Duration::from_millis(1)),
        ));

        let mut ids = Vec::new();
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let batch = queue.drain();
            assert!(batch.len() <= 1, "{} envelopes in one frame", batch.len());
            ids.extend(batch.into_iter().map(|e| e.data["id"].to_string()));
            if ids.len() == 3 {
                break;
            }
        }

        assert_eq!(ids, vec!["\"a\"", "\"b\"", "\"c\""]);
        assert_eq!(reader.await.unwrap().unwrap(), 3);
        assert_eq!(metrics.inbound_dropped.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_live_input_drops_when_full() {
        let queue = InboundQueue::new(1);
        let metrics = Arc::new(SyncMetrics::new());
        let count = read_envelopes(REPLAY, 1024, queue.sender(), metrics.clone(), None)
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(queue.drain().len(), 1);
        assert_eq!(metrics.inbound_dropped.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn test_shutdown_abandons_blocked_reads() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // Stands in for a stdin read waiting on a line that never comes
        runtime.spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));

        let started = Instant::now();
        shut_down(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
