use crate::domain::{IngestOutcome, ReadingIngestionService};
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, trace, warn, Instrument, Span};

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub broker_url: String,
    pub topic_filter: String,
    pub client_id: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    pub retry_delay_secs: u64,
    pub max_retry_attempts: u32,
}

impl MqttSubscriberConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            topic_filter: "sensor/#".to_string(),
            client_id: "weather-ingestion".to_string(),
            qos: 1,
            keep_alive_secs: 30,
            retry_delay_secs: 5,
            max_retry_attempts: 5,
        }
    }
}

/// Run the MQTT subscriber until cancelled.
///
/// Reconnects after connection errors; gives up with a transport failure
/// once `max_retry_attempts` consecutive attempts failed.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker_url = %config.broker_url, topic_filter = %config.topic_filter)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    ingestion: Arc<ReadingIngestionService>,
    shutdown_token: CancellationToken,
) -> DomainResult<()> {
    let qos = qos_level(config.qos)?;
    info!("starting MQTT subscriber");

    let mut retry_count = 0;

    loop {
        if shutdown_token.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        match run_mqtt_connection(
            &config,
            qos,
            &shutdown_token,
            Arc::clone(&ingestion),
            &mut retry_count,
        )
        .await
        {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(DomainError::TransportFailure(format!(
                        "gave up after {} attempts: {}",
                        retry_count, e
                    )));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Run a single MQTT connection session
#[instrument(name = "mqtt_connection", skip_all)]
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    qos: QoS,
    shutdown_token: &CancellationToken,
    ingestion: Arc<ReadingIngestionService>,
    retry_count: &mut u32,
) -> DomainResult<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.topic_filter, qos)
        .await
        .map_err(|e| DomainError::TransportFailure(format!("failed to subscribe: {}", e)))?;

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_mqtt_message(&ingestion, &publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %config.topic_filter, "subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        *retry_count = 0;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DomainError::TransportFailure(format!(
                            "MQTT event loop error: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}

/// Handle one inbound message in its own root span
pub(crate) async fn handle_mqtt_message(
    ingestion: &ReadingIngestionService,
    topic: &str,
    payload: &[u8],
) -> IngestOutcome {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
    );

    async {
        let outcome = ingestion.handle_message(topic, payload).await;
        trace!(outcome = ?outcome, "message handled");
        outcome
    }
    .instrument(span)
    .await
}

fn qos_level(level: u8) -> DomainResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(DomainError::InvalidInput(format!(
            "Invalid MQTT QoS level: {}",
            other
        ))),
    }
}

/// Parse broker URL in format mqtt://host:port, tcp://host:port or host:port
pub fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidInput(format!("Invalid port in broker URL: {}", port))
            })?;
            Ok((*host, port))
        }
        _ => Err(DomainError::InvalidInput(format!(
            "Invalid broker URL format: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{build_scheduler, AggregationPolicy, EmissionSink};
    use crate::mqtt::{TopicDecoder, TopicMode};

    fn ingestion() -> ReadingIngestionService {
        let sink = Arc::new(EmissionSink::new());
        let scheduler = build_scheduler(&AggregationPolicy::default(), Arc::clone(&sink));
        ReadingIngestionService::new(TopicDecoder::new(TopicMode::Strict), scheduler, sink)
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_tcp_scheme() {
        let (host, port) = parse_broker_url("tcp://broker.example.com:8883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("weather-broker").unwrap();
        assert_eq!(host, "weather-broker");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("tcp://host:notaport").is_err());
        assert!(parse_broker_url("tcp://a:1:2").is_err());
        assert!(parse_broker_url("tcp://").is_err());
    }

    #[test]
    fn test_qos_level() {
        assert_eq!(qos_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_level(3).is_err());
    }

    #[tokio::test]
    async fn test_handle_mqtt_message_routes_to_ingestion() {
        let ingestion = ingestion();

        let outcome = handle_mqtt_message(
            &ingestion,
            "sensor/6f1c2a9e-3b4d-4e5f-8a7b-1c2d3e4f5a6b/temp",
            b"22.0",
        )
        .await;
        assert_eq!(outcome, IngestOutcome::Accepted);

        let outcome = handle_mqtt_message(&ingestion, "invalid-topic", b"22.0").await;
        assert_eq!(outcome, IngestOutcome::IgnoredTopic);
    }
}
