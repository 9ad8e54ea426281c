use crate::domain::reading::{FieldName, Reading, SensorId};
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Backend-agnostic description of which readings a query wants.
///
/// The time range is half-open: `start <= timestamp < end`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingFilter {
    pub sensor_id: SensorId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fields: BTreeSet<FieldName>,
}

impl ReadingFilter {
    pub fn contains_timestamp(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp < self.end
    }
}

/// Repository trait for time-series storage of readings
/// Infrastructure layer (e.g., ClickHouse) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Persist a single emitted reading
    async fn store_reading(&self, reading: &Reading) -> DomainResult<()>;

    /// Fetch readings matching the filter.
    ///
    /// Implementations may return one partial reading per stored field;
    /// callers coalesce rows sharing sensor id and timestamp.
    async fn query_readings(&self, filter: &ReadingFilter) -> DomainResult<Vec<Reading>>;
}
