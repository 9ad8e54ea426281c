use crate::domain::{
    publish_reading, AggregationScheduler, AggregationStats, AggregationStatsSnapshot,
    EmissionSink, FieldUpdate,
};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, Reading, SensorId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct SensorBuffer {
    reading: Reading,
    /// Creation or last flush of this sensor's buffer
    baseline: Instant,
}

impl SensorBuffer {
    fn new(update: &FieldUpdate, now: Instant) -> Self {
        Self {
            reading: Reading::new(update.sensor_id, update.received_at),
            baseline: now,
        }
    }

    fn sensor_id(&self) -> SensorId {
        self.reading.sensor_id
    }

    fn is_due(&self, now: Instant, min_distance: Duration) -> bool {
        !self.reading.fields.is_empty() && now.saturating_duration_since(self.baseline) >= min_distance
    }

    fn apply(&mut self, update: FieldUpdate) {
        self.reading.fields.insert(update.field, update.value);
        if update.received_at > self.reading.timestamp {
            self.reading.timestamp = update.received_at;
        }
    }
}

/// Minimum-distance aggregation with a periodic drain.
///
/// All open buffers live in one queue behind a single lock. A buffer is
/// flushed either by the next update for its sensor or by the background
/// scan, whichever first sees it at least `min_dist_to_last_value` old.
pub struct MinDistanceScheduler {
    min_dist_to_last_value: Duration,
    publish_interval: Duration,
    sink: Arc<EmissionSink>,
    buffers: Mutex<VecDeque<SensorBuffer>>,
    closing: CancellationToken,
    stats: AggregationStats,
}

impl MinDistanceScheduler {
    pub fn new(
        min_dist_to_last_value: Duration,
        publish_interval: Duration,
        sink: Arc<EmissionSink>,
    ) -> Self {
        Self {
            min_dist_to_last_value,
            publish_interval,
            sink,
            buffers: Mutex::new(VecDeque::new()),
            closing: CancellationToken::new(),
            stats: AggregationStats::default(),
        }
    }

    /// Number of sensors with buffered fields
    pub async fn open_buffers(&self) -> usize {
        self.buffers.lock().await.len()
    }

    /// Remove and return every buffer that is due at `now`
    pub(crate) async fn take_due(&self, now: Instant) -> Vec<Reading> {
        let mut buffers = self.buffers.lock().await;
        let (due, pending): (VecDeque<_>, VecDeque<_>) = buffers
            .drain(..)
            .partition(|buffer| buffer.is_due(now, self.min_dist_to_last_value));
        *buffers = pending;
        due.into_iter().map(|buffer| buffer.reading).collect()
    }

    /// One pass of the periodic drain; returns how many readings were flushed
    pub async fn flush_due(&self) -> usize {
        let due = self.take_due(Instant::now()).await;
        let count = due.len();
        for reading in due {
            publish_reading(&self.sink, &self.stats, reading).await;
        }
        count
    }

    async fn discard_pending(&self) -> u64 {
        let mut buffers = self.buffers.lock().await;
        let pending = buffers
            .iter()
            .filter(|buffer| !buffer.reading.fields.is_empty())
            .count() as u64;
        for buffer in buffers.iter() {
            debug!(sensor_id = %buffer.sensor_id(), "discarding buffered fields on shutdown");
        }
        buffers.clear();
        pending
    }
}

#[async_trait]
impl AggregationScheduler for MinDistanceScheduler {
    #[instrument(skip_all, fields(sensor_id = %update.sensor_id, field = %update.field))]
    async fn submit(&self, update: FieldUpdate) -> DomainResult<()> {
        if self.closing.is_cancelled() {
            return Err(DomainError::AggregationClosed);
        }

        let now = Instant::now();
        let flushed = {
            let mut buffers = self.buffers.lock().await;
            let index = match buffers
                .iter()
                .position(|buffer| buffer.sensor_id() == update.sensor_id)
            {
                Some(index) => index,
                None => {
                    buffers.push_back(SensorBuffer::new(&update, now));
                    buffers.len() - 1
                }
            };

            let buffer = &mut buffers[index];
            let flushed = if buffer.is_due(now, self.min_dist_to_last_value) {
                let previous = std::mem::replace(buffer, SensorBuffer::new(&update, now));
                Some(previous.reading)
            } else {
                None
            };
            buffer.apply(update);
            flushed
        };

        if let Some(reading) = flushed {
            publish_reading(&self.sink, &self.stats, reading).await;
        }
        Ok(())
    }

    async fn run(&self, shutdown: CancellationToken) -> DomainResult<()> {
        info!(
            min_dist_ms = self.min_dist_to_last_value.as_millis() as u64,
            publish_interval_ms = self.publish_interval.as_millis() as u64,
            "min-distance aggregation started"
        );

        let mut ticker = tokio::time::interval(self.publish_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let flushed = self.flush_due().await;
                    if flushed > 0 {
                        debug!(flushed, "periodic drain flushed readings");
                    }
                }
            }
        }

        self.closing.cancel();
        let discarded = self.discard_pending().await;
        self.stats.record_discarded(discarded);
        if discarded > 0 {
            warn!(discarded, "buffered readings discarded on shutdown");
        }

        let stats = self.stats.snapshot();
        info!(
            emitted = stats.emitted,
            rejected = stats.rejected,
            discarded = stats.discarded,
            "min-distance aggregation stopped"
        );
        Ok(())
    }

    fn policy_name(&self) -> &'static str {
        "min_distance"
    }

    fn stats(&self) -> AggregationStatsSnapshot {
        self.stats.snapshot()
    }
}
