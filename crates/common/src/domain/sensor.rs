use crate::domain::reading::SensorId;
use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Registered weather sensor
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSensor {
    pub id: SensorId,
    pub name: String,
}

/// Existence check for sensors, owned by the sensor registry collaborator
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorResolver: Send + Sync {
    /// Returns whether a sensor with this id is registered
    async fn resolve_sensor(&self, sensor_id: SensorId) -> DomainResult<bool>;
}

/// In-memory sensor registry keyed by sensor id
pub struct InMemorySensorRegistry {
    sensors: Arc<RwLock<HashMap<SensorId, WeatherSensor>>>,
}

impl InMemorySensorRegistry {
    pub fn new() -> Self {
        Self {
            sensors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a sensor under a fresh id; names must be unique
    pub async fn register_sensor(&self, name: &str) -> DomainResult<WeatherSensor> {
        let mut sensors = self.sensors.write().await;
        if sensors.values().any(|s| s.name == name) {
            return Err(DomainError::SensorNameAlreadyExists(name.to_string()));
        }

        let sensor = WeatherSensor {
            id: SensorId::new_v4(),
            name: name.to_string(),
        };
        sensors.insert(sensor.id, sensor.clone());
        debug!(sensor_id = %sensor.id, name = %sensor.name, "registered sensor");
        Ok(sensor)
    }

    /// Register a sensor whose id was assigned elsewhere
    pub async fn insert_sensor(&self, sensor: WeatherSensor) {
        let mut sensors = self.sensors.write().await;
        sensors.insert(sensor.id, sensor);
    }

    pub async fn get_sensor(&self, sensor_id: SensorId) -> Option<WeatherSensor> {
        let sensors = self.sensors.read().await;
        sensors.get(&sensor_id).cloned()
    }

    pub async fn count(&self) -> usize {
        let sensors = self.sensors.read().await;
        sensors.len()
    }
}

impl Default for InMemorySensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorResolver for InMemorySensorRegistry {
    async fn resolve_sensor(&self, sensor_id: SensorId) -> DomainResult<bool> {
        let sensors = self.sensors.read().await;
        Ok(sensors.contains_key(&sensor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = InMemorySensorRegistry::new();
        let sensor = registry.register_sensor("rooftop").await.unwrap();

        assert!(registry.resolve_sensor(sensor.id).await.unwrap());
        assert!(!registry.resolve_sensor(SensorId::new_v4()).await.unwrap());
        assert_eq!(registry.get_sensor(sensor.id).await, Some(sensor));
    }

    #[tokio::test]
    async fn test_register_duplicate_name() {
        let registry = InMemorySensorRegistry::new();
        registry.register_sensor("rooftop").await.unwrap();

        let result = registry.register_sensor("rooftop").await;

        assert!(matches!(result, Err(DomainError::SensorNameAlreadyExists(_))));
        assert_eq!(registry.count().await, 1);
    }
}
