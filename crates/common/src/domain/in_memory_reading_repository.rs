use crate::domain::{DomainResult, Reading, ReadingFilter, ReadingRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory implementation of ReadingRepository, used when no time-series
/// backend is configured and in tests
#[derive(Clone, Default)]
pub struct InMemoryReadingRepository {
    readings: Arc<RwLock<Vec<Reading>>>,
}

impl InMemoryReadingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryReadingRepository {
    async fn store_reading(&self, reading: &Reading) -> DomainResult<()> {
        let mut readings = self.readings.write().await;
        readings.push(reading.clone());
        debug!(sensor_id = %reading.sensor_id, stored = readings.len(), "stored reading in memory");
        Ok(())
    }

    async fn query_readings(&self, filter: &ReadingFilter) -> DomainResult<Vec<Reading>> {
        let readings = self.readings.read().await;
        Ok(readings
            .iter()
            .filter(|r| r.sensor_id == filter.sensor_id && filter.contains_timestamp(&r.timestamp))
            .map(|r| r.project(&filter.fields))
            .filter(|r| !r.fields.is_empty())
            .collect())
    }
}
