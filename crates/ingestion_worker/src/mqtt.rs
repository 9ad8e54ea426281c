mod subscriber;
mod topic;

pub use subscriber::{parse_broker_url, run_mqtt_subscriber, MqttSubscriberConfig};
pub use topic::{ParsedTopic, TopicDecoder, TopicMode};
