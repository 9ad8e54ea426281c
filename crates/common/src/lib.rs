pub mod clickhouse;
pub mod domain;
pub mod telemetry;

pub use clickhouse::*;
pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockReadingRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSensorResolver;
