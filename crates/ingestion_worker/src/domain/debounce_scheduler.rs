use crate::domain::{
    publish_reading, AggregationScheduler, AggregationStats, AggregationStatsSnapshot,
    EmissionSink, FieldUpdate,
};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, Reading, SensorId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, trace};

type ChannelRegistry = Arc<RwLock<HashMap<SensorId, SensorChannel>>>;

struct SensorChannel {
    window_id: u64,
    sender: mpsc::Sender<FieldUpdate>,
}

/// Delay-after-first-message aggregation.
///
/// The first update for a quiet sensor opens a bounded channel plus two
/// tasks: a publisher that merges everything delivered on the channel, and a
/// timer that unregisters the channel after `publish_delay`. Once the last
/// sender is gone the publisher emits the merged reading.
pub struct DebounceScheduler {
    publish_delay: Duration,
    channel_capacity: usize,
    sink: Arc<EmissionSink>,
    channels: ChannelRegistry,
    next_window_id: AtomicU64,
    tasks: TaskTracker,
    closing: CancellationToken,
    stats: Arc<AggregationStats>,
}

impl DebounceScheduler {
    pub fn new(publish_delay: Duration, channel_capacity: usize, sink: Arc<EmissionSink>) -> Self {
        Self {
            publish_delay,
            channel_capacity: channel_capacity.max(1),
            sink,
            channels: Arc::new(RwLock::new(HashMap::new())),
            next_window_id: AtomicU64::new(0),
            tasks: TaskTracker::new(),
            closing: CancellationToken::new(),
            stats: Arc::new(AggregationStats::default()),
        }
    }

    /// Number of sensors with an open window
    pub async fn open_windows(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn sender_for(&self, sensor_id: SensorId) -> mpsc::Sender<FieldUpdate> {
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(&sensor_id) {
                return channel.sender.clone();
            }
        }

        let mut channels = self.channels.write().await;
        // Another submit may have opened the window while we waited
        if let Some(channel) = channels.get(&sensor_id) {
            return channel.sender.clone();
        }

        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let window_id = self.next_window_id.fetch_add(1, Ordering::Relaxed);
        channels.insert(
            sensor_id,
            SensorChannel {
                window_id,
                sender: sender.clone(),
            },
        );
        debug!(sensor_id = %sensor_id, window_id, "aggregation window opened");

        self.tasks.spawn(publish_window(
            sensor_id,
            receiver,
            Arc::clone(&self.sink),
            Arc::clone(&self.stats),
        ));
        self.tasks.spawn(close_window_after(
            sensor_id,
            window_id,
            self.publish_delay,
            Arc::clone(&self.channels),
            self.closing.clone(),
        ));

        sender
    }
}

#[async_trait]
impl AggregationScheduler for DebounceScheduler {
    #[instrument(skip_all, fields(sensor_id = %update.sensor_id, field = %update.field))]
    async fn submit(&self, update: FieldUpdate) -> DomainResult<()> {
        if self.closing.is_cancelled() {
            return Err(DomainError::AggregationClosed);
        }

        let sender = self.sender_for(update.sensor_id).await;
        // Blocks only this sensor's producer when its channel is full
        sender
            .send(update)
            .await
            .map_err(|_| DomainError::AggregationClosed)
    }

    async fn run(&self, shutdown: CancellationToken) -> DomainResult<()> {
        info!(
            publish_delay_ms = self.publish_delay.as_millis() as u64,
            channel_capacity = self.channel_capacity,
            "debounce aggregation started"
        );

        shutdown.cancelled().await;

        // Close every open window early so pending readings are flushed
        self.closing.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let stats = self.stats.snapshot();
        info!(
            emitted = stats.emitted,
            rejected = stats.rejected,
            "debounce aggregation stopped"
        );
        Ok(())
    }

    fn policy_name(&self) -> &'static str {
        "debounce"
    }

    fn stats(&self) -> AggregationStatsSnapshot {
        self.stats.snapshot()
    }
}

async fn publish_window(
    sensor_id: SensorId,
    mut receiver: mpsc::Receiver<FieldUpdate>,
    sink: Arc<EmissionSink>,
    stats: Arc<AggregationStats>,
) {
    let mut merged: Option<Reading> = None;

    while let Some(update) = receiver.recv().await {
        trace!(sensor_id = %sensor_id, field = %update.field, "merging field update");
        let reading = merged.get_or_insert_with(|| Reading::new(sensor_id, update.received_at));
        reading.fields.insert(update.field, update.value);
        if update.received_at > reading.timestamp {
            reading.timestamp = update.received_at;
        }
    }

    match merged {
        Some(reading) => publish_reading(&sink, &stats, reading).await,
        None => debug!(sensor_id = %sensor_id, "aggregation window closed without updates"),
    }
}

async fn close_window_after(
    sensor_id: SensorId,
    window_id: u64,
    publish_delay: Duration,
    channels: ChannelRegistry,
    closing: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(publish_delay) => {}
        _ = closing.cancelled() => {}
    }

    let mut channels = channels.write().await;
    // Only remove the window this timer was started for
    if channels.get(&sensor_id).map(|c| c.window_id) == Some(window_id) {
        channels.remove(&sensor_id);
        debug!(sensor_id = %sensor_id, window_id, "aggregation window closed");
    }
}
