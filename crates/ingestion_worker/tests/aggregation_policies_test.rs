//! Behaviour every aggregation policy must share, run against both.

use common::domain::{DomainError, DomainResult, FieldName, Reading, SensorId};
use ingestion_worker::mqtt::{TopicDecoder, TopicMode};
use ingestion_worker::{
    build_scheduler, AggregationPolicy, AggregationScheduler, EmissionSink, FieldUpdate,
    IngestOutcome, ReadingIngestionService,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Harness {
    sink: Arc<EmissionSink>,
    scheduler: Arc<dyn AggregationScheduler>,
    emitted: Arc<Mutex<Vec<Reading>>>,
    attempts: Arc<Mutex<Vec<Reading>>>,
    shutdown: CancellationToken,
    handle: JoinHandle<DomainResult<()>>,
}

impl Harness {
    fn start(policy: &AggregationPolicy) -> Self {
        Self::start_with_sink(policy, true)
    }

    /// Downstream refuses every reading handed to it
    fn start_rejecting(policy: &AggregationPolicy) -> Self {
        Self::start_with_sink(policy, false)
    }

    fn start_with_sink(policy: &AggregationPolicy, accept: bool) -> Self {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&emitted);
        let tried = Arc::clone(&attempts);
        let sink = Arc::new(EmissionSink::new().with_fn(move |reading| {
            tried.lock().unwrap().push(reading.clone());
            if !accept {
                return Err(DomainError::EmissionRejected("downstream unavailable".to_string()));
            }
            captured.lock().unwrap().push(reading.clone());
            Ok(())
        }));

        let scheduler = build_scheduler(policy, Arc::clone(&sink));
        let shutdown = CancellationToken::new();
        let handle = {
            let scheduler = Arc::clone(&scheduler);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.run(shutdown).await })
        };

        Self {
            sink,
            scheduler,
            emitted,
            attempts,
            shutdown,
            handle,
        }
    }

    async fn submit(&self, sensor_id: SensorId, field: FieldName, value: f64) {
        self.scheduler
            .submit(FieldUpdate::new(sensor_id, field, value))
            .await
            .unwrap();
    }

    fn emitted(&self) -> Vec<Reading> {
        self.emitted.lock().unwrap().clone()
    }

    fn attempts(&self) -> Vec<Reading> {
        self.attempts.lock().unwrap().clone()
    }

    async fn stop(self) -> Vec<Reading> {
        let Harness {
            emitted,
            shutdown,
            handle,
            ..
        } = self;
        shutdown.cancel();
        handle.await.unwrap().unwrap();
        let emitted = emitted.lock().unwrap().clone();
        emitted
    }
}

fn debounce() -> AggregationPolicy {
    AggregationPolicy::Debounce {
        publish_delay: Duration::from_secs(1),
        channel_capacity: 10,
    }
}

fn min_distance() -> AggregationPolicy {
    AggregationPolicy::MinDistance {
        min_dist_to_last_value: Duration::from_secs(2),
        publish_interval: Duration::from_secs(1),
    }
}

fn policies() -> [AggregationPolicy; 2] {
    [debounce(), min_distance()]
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_fields_in_one_window_merge_into_one_reading() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        let sensor_id = SensorId::new_v4();

        harness.submit(sensor_id, FieldName::Temperature, 20.0).await;
        harness.submit(sensor_id, FieldName::Humidity, 50.0).await;
        sleep_secs(5).await;

        let emitted = harness.emitted();
        assert_eq!(emitted.len(), 1, "policy {}", policy.name());
        assert_eq!(emitted[0].sensor_id, sensor_id);
        assert_eq!(emitted[0].fields.get(&FieldName::Temperature), Some(&20.0));
        assert_eq!(emitted[0].fields.get(&FieldName::Humidity), Some(&50.0));

        harness.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_fields_in_separate_windows_emit_separately() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        let sensor_id = SensorId::new_v4();

        harness.submit(sensor_id, FieldName::Temperature, 20.0).await;
        sleep_secs(3).await;
        harness.submit(sensor_id, FieldName::Humidity, 50.0).await;
        sleep_secs(5).await;

        let emitted = harness.stop().await;
        assert_eq!(emitted.len(), 2, "policy {}", policy.name());
        assert_eq!(emitted[0].fields.len(), 1);
        assert_eq!(emitted[0].fields.get(&FieldName::Temperature), Some(&20.0));
        assert_eq!(emitted[1].fields.len(), 1);
        assert_eq!(emitted[1].fields.get(&FieldName::Humidity), Some(&50.0));
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_traffic_means_no_emissions() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        sleep_secs(10).await;

        let emitted = harness.stop().await;
        assert!(emitted.is_empty(), "policy {}", policy.name());
    }
}

#[tokio::test(start_paused = true)]
async fn test_sensors_are_aggregated_independently() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        let first = SensorId::new_v4();
        let second = SensorId::new_v4();

        harness.submit(first, FieldName::Pressure, 1001.0).await;
        harness.submit(second, FieldName::Pressure, 1002.0).await;
        sleep_secs(5).await;

        let emitted = harness.stop().await;
        assert_eq!(emitted.len(), 2, "policy {}", policy.name());
        let value_of = |id: SensorId| {
            emitted
                .iter()
                .find(|r| r.sensor_id == id)
                .and_then(|r| r.fields.get(&FieldName::Pressure).copied())
        };
        assert_eq!(value_of(first), Some(1001.0));
        assert_eq!(value_of(second), Some(1002.0));
    }
}

#[tokio::test(start_paused = true)]
async fn test_emissions_per_sensor_are_ordered_by_timestamp() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        let sensor_id = SensorId::new_v4();

        for value in 0..5 {
            harness
                .submit(sensor_id, FieldName::Temperature, value as f64)
                .await;
            sleep_secs(3).await;
        }

        let emitted = harness.stop().await;
        assert_eq!(emitted.len(), 5, "policy {}", policy.name());
        assert!(emitted
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_keeps_buffered_fields() {
    const ID: &str = "6f1c2a9e-3b4d-4e5f-8a7b-1c2d3e4f5a6b";

    for policy in policies() {
        let harness = Harness::start(&policy);
        let ingestion = ReadingIngestionService::new(
            TopicDecoder::new(TopicMode::Strict),
            Arc::clone(&harness.scheduler),
            Arc::clone(&harness.sink),
        );

        let outcomes = [
            ingestion
                .handle_message(&format!("sensor/{}/temperature", ID), b"20.5")
                .await,
            ingestion
                .handle_message(&format!("sensor/{}/pressure", ID), b"not-a-number")
                .await,
            ingestion
                .handle_message(&format!("sensor/{}/humidity", ID), b"61")
                .await,
        ];
        assert_eq!(
            outcomes,
            [
                IngestOutcome::Accepted,
                IngestOutcome::MalformedPayload,
                IngestOutcome::Accepted
            ]
        );
        sleep_secs(5).await;

        let emitted = harness.stop().await;
        assert_eq!(emitted.len(), 1, "policy {}", policy.name());
        assert_eq!(emitted[0].fields.len(), 2);
        assert!(!emitted[0].fields.contains_key(&FieldName::Pressure));
    }
}

#[tokio::test(start_paused = true)]
async fn test_min_distance_messages_closer_than_distance_emit_once() {
    let harness = Harness::start(&min_distance());
    let sensor_id = SensorId::new_v4();

    harness.submit(sensor_id, FieldName::Temperature, 20.0).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.submit(sensor_id, FieldName::Temperature, 20.5).await;
    sleep_secs(5).await;

    let emitted = harness.stop().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].fields.get(&FieldName::Temperature), Some(&20.5));
}

#[tokio::test(start_paused = true)]
async fn test_min_distance_one_message_per_second_for_three_seconds() {
    let harness = Harness::start(&min_distance());
    let sensor_id = SensorId::new_v4();

    harness.submit(sensor_id, FieldName::Temperature, 20.0).await;
    sleep_secs(1).await;
    harness.submit(sensor_id, FieldName::Temperature, 21.0).await;
    sleep_secs(1).await;
    harness.submit(sensor_id, FieldName::Temperature, 22.0).await;
    sleep_secs(5).await;

    let emitted = harness.stop().await;
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[1].fields.get(&FieldName::Temperature), Some(&22.0));
}

#[tokio::test(start_paused = true)]
async fn test_updates_after_shutdown_are_refused() {
    for policy in policies() {
        let harness = Harness::start(&policy);
        let scheduler = Arc::clone(&harness.scheduler);
        harness.stop().await;

        let result = scheduler
            .submit(FieldUpdate::new(SensorId::new_v4(), FieldName::Humidity, 1.0))
            .await;
        assert!(result.is_err(), "policy {}", policy.name());
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_emissions_are_counted_and_aggregation_continues() {
    for policy in policies() {
        let harness = Harness::start_rejecting(&policy);
        let sensor_id = SensorId::new_v4();

        harness.submit(sensor_id, FieldName::Temperature, 20.0).await;
        sleep_secs(3).await;
        harness.submit(sensor_id, FieldName::Humidity, 50.0).await;
        sleep_secs(5).await;

        let stats = harness.scheduler.stats();
        assert_eq!(stats.rejected, 2, "policy {}", policy.name());
        assert_eq!(stats.emitted, 0, "policy {}", policy.name());
        assert!(harness.emitted().is_empty());

        // Rejected readings are dropped, not retried
        let attempts = harness.attempts();
        assert_eq!(attempts.len(), 2, "policy {}", policy.name());
        assert_eq!(attempts[0].fields.get(&FieldName::Temperature), Some(&20.0));
        assert_eq!(attempts[1].fields.get(&FieldName::Humidity), Some(&50.0));

        // The scheduler keeps accepting and aggregating updates
        harness.submit(sensor_id, FieldName::Pressure, 1013.0).await;
        sleep_secs(5).await;
        assert_eq!(harness.scheduler.stats().rejected, 3, "policy {}", policy.name());
        assert_eq!(harness.attempts().len(), 3);

        harness.stop().await;
    }
}
