use crate::domain::{DebounceScheduler, EmissionSink, FieldUpdate, MinDistanceScheduler};
use async_trait::async_trait;
use common::domain::{DomainResult, Reading};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which flush strategy the aggregation engine runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// One window per sensor opened by its first message and closed
    /// `publish_delay` later
    Debounce {
        publish_delay: Duration,
        channel_capacity: usize,
    },
    /// Emit a sensor's buffer once it is at least `min_dist_to_last_value`
    /// old, checked on every message and on a periodic scan
    MinDistance {
        min_dist_to_last_value: Duration,
        publish_interval: Duration,
    },
}

impl AggregationPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationPolicy::Debounce { .. } => "debounce",
            AggregationPolicy::MinDistance { .. } => "min_distance",
        }
    }
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy::MinDistance {
            min_dist_to_last_value: Duration::from_millis(250),
            publish_interval: Duration::from_secs(1),
        }
    }
}

/// Buffers per-field updates and hands completed readings to the sink
#[async_trait]
pub trait AggregationScheduler: Send + Sync {
    /// Feed one field update into the sensor's open buffer
    async fn submit(&self, update: FieldUpdate) -> DomainResult<()>;

    /// Drive background work until `shutdown` is cancelled
    async fn run(&self, shutdown: CancellationToken) -> DomainResult<()>;

    fn policy_name(&self) -> &'static str;

    fn stats(&self) -> AggregationStatsSnapshot;
}

/// Build the scheduler for a policy, emitting into `sink`
pub fn build_scheduler(
    policy: &AggregationPolicy,
    sink: Arc<EmissionSink>,
) -> Arc<dyn AggregationScheduler> {
    match policy {
        AggregationPolicy::Debounce {
            publish_delay,
            channel_capacity,
        } => Arc::new(DebounceScheduler::new(*publish_delay, *channel_capacity, sink)),
        AggregationPolicy::MinDistance {
            min_dist_to_last_value,
            publish_interval,
        } => Arc::new(MinDistanceScheduler::new(
            *min_dist_to_last_value,
            *publish_interval,
            sink,
        )),
    }
}

#[derive(Debug, Default)]
pub struct AggregationStats {
    emitted: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of the aggregation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStatsSnapshot {
    pub emitted: u64,
    pub rejected: u64,
    pub discarded: u64,
}

impl AggregationStats {
    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AggregationStatsSnapshot {
        AggregationStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Hand a flushed reading to the sink. Failures are logged and counted,
/// never retried.
pub(crate) async fn publish_reading(sink: &EmissionSink, stats: &AggregationStats, reading: Reading) {
    match sink.emit(&reading).await {
        Ok(()) => {
            stats.record_emitted();
            debug!(
                sensor_id = %reading.sensor_id,
                timestamp = %reading.timestamp,
                field_count = reading.fields.len(),
                "reading emitted"
            );
        }
        Err(e) => {
            stats.record_rejected();
            warn!(sensor_id = %reading.sensor_id, error = %e, "emission failed, reading dropped");
        }
    }
}
