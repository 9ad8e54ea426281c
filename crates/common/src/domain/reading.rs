use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::result::{DomainError, DomainResult};

/// Sensors are identified by a 128-bit UUID
pub type SensorId = uuid::Uuid;

/// JSON key carrying the sensor id of a rendered reading
pub const SENSOR_ID_KEY: &str = "sensorId";
/// JSON key carrying the timestamp of a rendered reading
pub const TIMESTAMP_KEY: &str = "timeStamp";

/// Name of a measured quantity.
///
/// The four known fields are the only ones the query side filters on.
/// Anything else is carried through ingestion untouched as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldName {
    Temperature,
    Pressure,
    Humidity,
    Co2Level,
    Other(String),
}

impl FieldName {
    /// The fixed set of fields the system reasons about
    pub fn known() -> [FieldName; 4] {
        [
            FieldName::Temperature,
            FieldName::Pressure,
            FieldName::Humidity,
            FieldName::Co2Level,
        ]
    }

    /// All known fields as a set, the default selection of a query
    pub fn known_set() -> BTreeSet<FieldName> {
        Self::known().into_iter().collect()
    }

    /// Parse one of the known field names, `None` for anything else
    pub fn parse_known(name: &str) -> Option<FieldName> {
        match name {
            "temperature" => Some(FieldName::Temperature),
            "pressure" => Some(FieldName::Pressure),
            "humidity" => Some(FieldName::Humidity),
            "co2level" => Some(FieldName::Co2Level),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldName::Temperature => "temperature",
            FieldName::Pressure => "pressure",
            FieldName::Humidity => "humidity",
            FieldName::Co2Level => "co2level",
            FieldName::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FieldName::Other(_))
    }
}

impl From<&str> for FieldName {
    fn from(name: &str) -> Self {
        FieldName::parse_known(name).unwrap_or_else(|| FieldName::Other(name.to_string()))
    }
}

impl From<String> for FieldName {
    fn from(name: String) -> Self {
        match FieldName::parse_known(&name) {
            Some(field) => field,
            None => FieldName::Other(name),
        }
    }
}

impl From<FieldName> for String {
    fn from(field: FieldName) -> Self {
        match field {
            FieldName::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-stamped set of field values reported by one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<FieldName, f64>,
}

impl Reading {
    pub fn new(sensor_id: SensorId, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldName, value: f64) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// A reading may only leave the aggregation engine with at least one
    /// field and a real timestamp
    pub fn is_emittable(&self) -> bool {
        !self.fields.is_empty() && self.timestamp != DateTime::<Utc>::UNIX_EPOCH
    }

    /// Copy of this reading holding only the requested fields
    pub fn project(&self, requested: &BTreeSet<FieldName>) -> Reading {
        Reading {
            sensor_id: self.sensor_id,
            timestamp: self.timestamp,
            fields: self
                .fields
                .iter()
                .filter(|(field, _)| requested.contains(*field))
                .map(|(field, value)| (field.clone(), *value))
                .collect(),
        }
    }

    /// Flat JSON rendering: `{sensorId, timeStamp, <field>: value, ...}`
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(
            SENSOR_ID_KEY.to_string(),
            serde_json::Value::String(self.sensor_id.to_string()),
        );
        map.insert(
            TIMESTAMP_KEY.to_string(),
            serde_json::Value::String(self.timestamp.to_rfc3339()),
        );
        for (field, value) in &self.fields {
            // Non-finite values have no JSON representation
            if let Some(number) = serde_json::Number::from_f64(*value) {
                map.insert(field.to_string(), serde_json::Value::Number(number));
            }
        }
        map
    }

    /// Parse the flat JSON rendering back into a reading.
    ///
    /// `timeStamp` is required and must be RFC 3339; `sensorId` is optional
    /// and defaults to the nil UUID. Non-numeric members are ignored.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> DomainResult<Reading> {
        let sensor_id = match map.get(SENSOR_ID_KEY) {
            None => SensorId::nil(),
            Some(serde_json::Value::String(id)) => SensorId::parse_str(id)
                .map_err(|e| DomainError::InvalidInput(format!("invalid sensorId '{}': {}", id, e)))?,
            Some(_) => {
                return Err(DomainError::InvalidInput(
                    "sensorId must be of type string".to_string(),
                ))
            }
        };

        let timestamp = match map.get(TIMESTAMP_KEY) {
            Some(serde_json::Value::String(ts)) => DateTime::parse_from_rfc3339(ts)
                .map_err(|e| DomainError::InvalidInput(format!("invalid timeStamp '{}': {}", ts, e)))?
                .with_timezone(&Utc),
            _ => {
                return Err(DomainError::InvalidInput(
                    "timeStamp must be of type string".to_string(),
                ))
            }
        };

        let fields = map
            .iter()
            .filter(|(key, _)| key.as_str() != SENSOR_ID_KEY && key.as_str() != TIMESTAMP_KEY)
            .filter_map(|(key, value)| value.as_f64().map(|v| (FieldName::from(key.as_str()), v)))
            .collect();

        Ok(Reading {
            sensor_id,
            timestamp,
            fields,
        })
    }
}
