use crate::domain::{parse_field_value, AggregationScheduler, EmissionSink, FieldUpdate};
use crate::mqtt::TopicDecoder;
use common::domain::{DomainError, DomainResult, Reading};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    IgnoredTopic,
    MalformedPayload,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub ignored_topics: u64,
    pub malformed_payloads: u64,
}

/// Turns raw transport messages into field updates for the aggregation engine
pub struct ReadingIngestionService {
    decoder: TopicDecoder,
    scheduler: Arc<dyn AggregationScheduler>,
    sink: Arc<EmissionSink>,
    ignored_topics: AtomicU64,
    malformed_payloads: AtomicU64,
}

impl ReadingIngestionService {
    pub fn new(
        decoder: TopicDecoder,
        scheduler: Arc<dyn AggregationScheduler>,
        sink: Arc<EmissionSink>,
    ) -> Self {
        Self {
            decoder,
            scheduler,
            sink,
            ignored_topics: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
        }
    }

    /// Decode one message and feed it into its sensor's buffer.
    ///
    /// Topics that do not address a sensor field are skipped silently. A bad
    /// payload drops only this message; buffered fields stay untouched.
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        let Some(parsed) = self.decoder.decode(topic) else {
            self.ignored_topics.fetch_add(1, Ordering::Relaxed);
            debug!("topic does not address a sensor field, ignoring");
            return IngestOutcome::IgnoredTopic;
        };

        let value = match parse_field_value(payload) {
            Ok(value) => value,
            Err(e) => {
                self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
                warn!(sensor_id = %parsed.sensor_id, field = %parsed.field, error = %e, "dropping malformed payload");
                return IngestOutcome::MalformedPayload;
            }
        };

        let update = FieldUpdate::new(parsed.sensor_id, parsed.field, value);
        match self.scheduler.submit(update).await {
            Ok(()) => IngestOutcome::Accepted,
            Err(e) => {
                debug!(error = %e, "aggregation not accepting updates");
                IngestOutcome::Closed
            }
        }
    }

    /// Emit a complete reading directly, bypassing aggregation
    #[instrument(skip_all, fields(sensor_id = %reading.sensor_id))]
    pub async fn submit_reading(&self, reading: Reading) -> DomainResult<()> {
        if !reading.is_emittable() {
            return Err(DomainError::InvalidInput(
                "reading must carry at least one field and a timestamp".to_string(),
            ));
        }
        self.sink.emit(&reading).await
    }

    pub fn scheduler(&self) -> &Arc<dyn AggregationScheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> IngestionStats {
        IngestionStats {
            ignored_topics: self.ignored_topics.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
        }
    }
}
