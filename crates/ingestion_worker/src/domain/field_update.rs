use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult, FieldName, SensorId};

/// A single field value received for one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub sensor_id: SensorId,
    pub field: FieldName,
    pub value: f64,
    pub received_at: DateTime<Utc>,
}

impl FieldUpdate {
    /// Build an update stamped with the current wall-clock time
    pub fn new(sensor_id: SensorId, field: FieldName, value: f64) -> Self {
        Self {
            sensor_id,
            field,
            value,
            received_at: Utc::now(),
        }
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// Parse a message payload as a single decimal value.
///
/// Payloads are UTF-8 text with optional surrounding whitespace. NaN and
/// infinities are rejected so they never reach a stored reading.
pub fn parse_field_value(payload: &[u8]) -> DomainResult<f64> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| DomainError::InvalidInput(format!("payload is not UTF-8: {}", e)))?;
    let trimmed = text.trim();

    let value = trimmed.parse::<f64>().map_err(|e| {
        DomainError::InvalidInput(format!("payload '{}' is not a number: {}", trimmed, e))
    })?;

    if !value.is_finite() {
        return Err(DomainError::InvalidInput(format!(
            "payload '{}' is not a finite number",
            trimmed
        )));
    }

    Ok(value)
}
