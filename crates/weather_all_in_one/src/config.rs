use common::clickhouse::ClickHouseConfig;
use common::domain::SensorId;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use ingestion_worker::mqtt::{MqttSubscriberConfig, TopicMode};
use ingestion_worker::AggregationPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// Broker URL, `tcp://host:port`
    #[serde(default = "default_mqtt_url")]
    pub mqtt_url: String,

    /// Topic filter to subscribe to
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Subscription QoS (0, 1 or 2)
    #[serde(default = "default_mqtt_qos")]
    pub mqtt_qos: u8,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Consecutive failed connections before the subscriber gives up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Accept field suffixes outside the known set
    #[serde(default)]
    pub permissive_topics: bool,

    // Aggregation configuration
    /// `debounce` or `min_distance`
    #[serde(default = "default_aggregation_policy")]
    pub aggregation_policy: String,

    /// Debounce window length in milliseconds
    #[serde(default = "default_publish_delay_ms")]
    pub publish_delay_ms: u64,

    /// Per-sensor channel capacity of the debounce policy
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Periodic drain interval of the min-distance policy in milliseconds
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Minimum age of a buffer before the min-distance policy flushes it
    #[serde(default = "default_min_dist_to_last_value_ms")]
    pub min_dist_to_last_value_ms: u64,

    // Sensor registry configuration
    #[serde(default)]
    pub allow_unregistered_sensors: bool,

    /// Comma separated sensor ids known at startup
    #[serde(default)]
    pub registered_sensors: String,

    // Storage configuration
    /// `memory` or `clickhouse`
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    #[serde(default = "default_clickhouse_readings_table")]
    pub clickhouse_readings_table: String,

    // Telemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    /// Time allowed for closers after all processes stopped
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mqtt_url() -> String {
    "tcp://localhost:1883".to_string()
}

fn default_mqtt_topic() -> String {
    "sensor/#".to_string()
}

fn default_mqtt_client_id() -> String {
    "weather-all-in-one".to_string()
}

fn default_mqtt_qos() -> u8 {
    2
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_aggregation_policy() -> String {
    "min_distance".to_string()
}

fn default_publish_delay_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    10
}

fn default_publish_interval_ms() -> u64 {
    1000
}

fn default_min_dist_to_last_value_ms() -> u64 {
    250
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "weather".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    "".to_string()
}

fn default_clickhouse_readings_table() -> String {
    "sensor_readings".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "weather-all-in-one".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    /// Load configuration from `WEATHER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("WEATHER"))
            .build()?;

        config.try_deserialize()
    }

    pub fn aggregation_policy(&self) -> anyhow::Result<AggregationPolicy> {
        match self.aggregation_policy.as_str() {
            "debounce" => {
                if self.publish_delay_ms == 0 {
                    anyhow::bail!("publish_delay_ms must be positive");
                }
                Ok(AggregationPolicy::Debounce {
                    publish_delay: Duration::from_millis(self.publish_delay_ms),
                    channel_capacity: self.channel_capacity,
                })
            }
            "min_distance" => {
                if self.publish_interval_ms == 0 {
                    anyhow::bail!("publish_interval_ms must be positive");
                }
                Ok(AggregationPolicy::MinDistance {
                    min_dist_to_last_value: Duration::from_millis(self.min_dist_to_last_value_ms),
                    publish_interval: Duration::from_millis(self.publish_interval_ms),
                })
            }
            other => anyhow::bail!(
                "unknown aggregation policy '{}', expected 'debounce' or 'min_distance'",
                other
            ),
        }
    }

    pub fn topic_mode(&self) -> TopicMode {
        if self.permissive_topics {
            TopicMode::Permissive
        } else {
            TopicMode::Strict
        }
    }

    pub fn mqtt_subscriber_config(&self) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            broker_url: self.mqtt_url.clone(),
            topic_filter: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            qos: self.mqtt_qos,
            keep_alive_secs: self.mqtt_keep_alive_secs,
            retry_delay_secs: self.mqtt_retry_delay_secs,
            max_retry_attempts: self.mqtt_max_retry_attempts,
        }
    }

    pub fn clickhouse_config(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            url: self.clickhouse_url.clone(),
            database: self.clickhouse_database.clone(),
            username: self.clickhouse_username.clone(),
            password: self.clickhouse_password.clone(),
            readings_table: self.clickhouse_readings_table.clone(),
        }
    }

    pub fn registered_sensor_ids(&self) -> anyhow::Result<Vec<SensorId>> {
        self.registered_sensors
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                SensorId::parse_str(id)
                    .map_err(|e| anyhow::anyhow!("invalid registered sensor id '{}': {}", id, e))
            })
            .collect()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Span export is only configured when OTEL is enabled
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let telemetry = TelemetryConfig::new(&self.otel_service_name, &self.log_level);
        if self.otel_enabled {
            telemetry.with_otlp_endpoint(&self.otel_endpoint)
        } else {
            telemetry
        }
    }
}
