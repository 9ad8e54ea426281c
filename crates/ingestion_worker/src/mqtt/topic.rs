use common::domain::{FieldName, SensorId};

const TOPIC_PREFIX: &str = "sensor";
const CANONICAL_UUID_LEN: usize = 36;
/// Suffix used by older firmware for temperature
const LEGACY_TEMPERATURE_SUFFIX: &str = "temp";

/// How field suffixes outside the known set are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicMode {
    /// Only the known field names are accepted
    #[default]
    Strict,
    /// Any non-empty suffix is carried through as an opaque field
    Permissive,
}

/// Sensor and field addressed by a `sensor/<uuid>/<field>` topic
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub sensor_id: SensorId,
    pub field: FieldName,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicDecoder {
    mode: TopicMode,
}

impl TopicDecoder {
    pub fn new(mode: TopicMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> TopicMode {
        self.mode
    }

    /// Decode a topic, `None` when it does not address a sensor field
    ///
    /// ```
    /// use ingestion_worker::mqtt::{TopicDecoder, TopicMode};
    /// use common::domain::FieldName;
    ///
    /// let decoder = TopicDecoder::new(TopicMode::Strict);
    /// let parsed = decoder
    ///     .decode("sensor/6f1c2a9e-3b4d-4e5f-8a7b-1c2d3e4f5a6b/humidity")
    ///     .unwrap();
    /// assert_eq!(parsed.field, FieldName::Humidity);
    /// assert!(decoder.decode("garage/door").is_none());
    /// ```
    pub fn decode(&self, topic: &str) -> Option<ParsedTopic> {
        let mut segments = topic.split('/');
        let (prefix, id, suffix) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() || prefix != TOPIC_PREFIX {
            return None;
        }

        // Only the hyphenated form is accepted, not simple or braced UUIDs
        if id.len() != CANONICAL_UUID_LEN {
            return None;
        }
        let sensor_id = SensorId::parse_str(id).ok()?;

        let field = self.decode_field(suffix)?;
        Some(ParsedTopic { sensor_id, field })
    }

    fn decode_field(&self, suffix: &str) -> Option<FieldName> {
        if suffix == LEGACY_TEMPERATURE_SUFFIX {
            return Some(FieldName::Temperature);
        }

        match (FieldName::parse_known(suffix), self.mode) {
            (Some(field), _) => Some(field),
            (None, TopicMode::Permissive) if !suffix.is_empty() => {
                Some(FieldName::Other(suffix.to_string()))
            }
            _ => None,
        }
    }
}
