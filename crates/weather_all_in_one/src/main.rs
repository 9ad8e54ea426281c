mod config;

use common::clickhouse::{ClickHouseClient, ClickHouseReadingRepository};
use common::domain::{
    InMemoryReadingRepository, InMemorySensorRegistry, ReadingRepository, WeatherSensor,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use ingestion_worker::{
    EmissionSink, IngestionWorker, IngestionWorkerConfig, PersistReadingHandler, RegistrationGate,
};
use std::sync::Arc;
use tracing::{debug, error, info};
use weather_runner::Runner;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        storage_backend = %config.storage_backend,
        aggregation_policy = %config.aggregation_policy,
        "Starting weather-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let policy = match config.aggregation_policy() {
        Ok(policy) => policy,
        Err(e) => {
            error!("Invalid aggregation configuration: {}", e);
            std::process::exit(1);
        }
    };

    let reading_repository = match initialize_reading_repository(&config).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize reading repository: {}", e);
            std::process::exit(1);
        }
    };

    let sensor_registry = match initialize_sensor_registry(&config).await {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to initialize sensor registry: {}", e);
            std::process::exit(1);
        }
    };

    // Registration gate runs first so unknown sensors never reach storage
    let sink = EmissionSink::new()
        .with_handler(Arc::new(RegistrationGate::new(
            sensor_registry,
            config.allow_unregistered_sensors,
        )))
        .with_handler(Arc::new(PersistReadingHandler::new(reading_repository)));

    let ingestion_worker = IngestionWorker::new(
        Arc::new(sink),
        IngestionWorkerConfig {
            policy,
            topic_mode: config.topic_mode(),
            mqtt: config.mqtt_subscriber_config(),
        },
    );

    let mut runner = Runner::new().with_closer_timeout(config.shutdown_timeout());

    for (name, process) in ingestion_worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner.with_closer(move || async move {
        info!("Running cleanup tasks...");
        shutdown_telemetry(telemetry_providers);
        info!("Cleanup complete");
        Ok(())
    });

    runner.run().await;
}

async fn initialize_reading_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn ReadingRepository>> {
    match config.storage_backend.as_str() {
        "memory" => {
            info!("Using in-memory reading storage");
            Ok(Arc::new(InMemoryReadingRepository::new()))
        }
        "clickhouse" => {
            let clickhouse_config = config.clickhouse_config();
            let client = ClickHouseClient::new(&clickhouse_config);
            client.ping().await?;
            info!(url = %clickhouse_config.url, "Connected to ClickHouse");

            let repository =
                ClickHouseReadingRepository::new(client, clickhouse_config.readings_table);
            repository.ensure_table().await?;
            Ok(Arc::new(repository))
        }
        other => anyhow::bail!(
            "unknown storage backend '{}', expected 'memory' or 'clickhouse'",
            other
        ),
    }
}

async fn initialize_sensor_registry(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<InMemorySensorRegistry>> {
    let registry = InMemorySensorRegistry::new();
    for sensor_id in config.registered_sensor_ids()? {
        registry
            .insert_sensor(WeatherSensor {
                id: sensor_id,
                name: format!("sensor-{}", sensor_id),
            })
            .await;
    }
    info!(sensors = registry.count().await, "Sensor registry initialized");
    Ok(Arc::new(registry))
}
