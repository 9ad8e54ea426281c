use crate::domain::ReadingHandler;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, Reading, ReadingRepository, SensorResolver};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drops readings from sensors the registry does not know about
pub struct RegistrationGate {
    resolver: Arc<dyn SensorResolver>,
    allow_unregistered: bool,
}

impl RegistrationGate {
    pub fn new(resolver: Arc<dyn SensorResolver>, allow_unregistered: bool) -> Self {
        Self {
            resolver,
            allow_unregistered,
        }
    }
}

#[async_trait]
impl ReadingHandler for RegistrationGate {
    async fn handle_reading(&self, reading: &Reading) -> DomainResult<()> {
        if self.allow_unregistered {
            return Ok(());
        }

        if self.resolver.resolve_sensor(reading.sensor_id).await? {
            Ok(())
        } else {
            warn!(sensor_id = %reading.sensor_id, "reading from unregistered sensor rejected");
            Err(DomainError::EmissionRejected(format!(
                "sensor {} is not registered",
                reading.sensor_id
            )))
        }
    }
}

/// Stores every reading that reaches it
pub struct PersistReadingHandler {
    repository: Arc<dyn ReadingRepository>,
}

impl PersistReadingHandler {
    pub fn new(repository: Arc<dyn ReadingRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl ReadingHandler for PersistReadingHandler {
    async fn handle_reading(&self, reading: &Reading) -> DomainResult<()> {
        self.repository.store_reading(reading).await?;
        debug!(sensor_id = %reading.sensor_id, timestamp = %reading.timestamp, "reading stored");
        Ok(())
    }
}
