use crate::domain::{
    build_scheduler, AggregationPolicy, AggregationScheduler, EmissionSink, ReadingIngestionService,
};
use crate::mqtt::{run_mqtt_subscriber, MqttSubscriberConfig, TopicDecoder, TopicMode};
use std::sync::Arc;
use tracing::info;
use weather_runner::AppProcess;

pub struct IngestionWorkerConfig {
    pub policy: AggregationPolicy,
    pub topic_mode: TopicMode,
    pub mqtt: MqttSubscriberConfig,
}

/// MQTT ingestion plus the aggregation engine it feeds
pub struct IngestionWorker {
    scheduler: Arc<dyn AggregationScheduler>,
    ingestion: Arc<ReadingIngestionService>,
    mqtt_config: MqttSubscriberConfig,
}

impl IngestionWorker {
    pub fn new(sink: Arc<EmissionSink>, config: IngestionWorkerConfig) -> Self {
        info!(
            policy = config.policy.name(),
            topic_mode = ?config.topic_mode,
            handlers = sink.len(),
            "Initializing ingestion worker"
        );

        let scheduler = build_scheduler(&config.policy, Arc::clone(&sink));
        let ingestion = Arc::new(ReadingIngestionService::new(
            TopicDecoder::new(config.topic_mode),
            Arc::clone(&scheduler),
            sink,
        ));

        Self {
            scheduler,
            ingestion,
            mqtt_config: config.mqtt,
        }
    }

    pub fn ingestion_service(&self) -> Arc<ReadingIngestionService> {
        Arc::clone(&self.ingestion)
    }

    pub fn into_runner_processes(self) -> Vec<(String, AppProcess)> {
        let scheduler = self.scheduler;
        let scheduler_process: AppProcess =
            Box::new(move |ctx| Box::pin(async move { Ok(scheduler.run(ctx).await?) }));

        let ingestion = self.ingestion;
        let config = self.mqtt_config;
        let subscriber_process: AppProcess = Box::new(move |ctx| {
            Box::pin(async move { Ok(run_mqtt_subscriber(config, ingestion, ctx).await?) })
        });

        vec![
            ("aggregation_scheduler".to_string(), scheduler_process),
            ("mqtt_subscriber".to_string(), subscriber_process),
        ]
    }
}
