use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Emission rejected: {0}")]
    EmissionRejected(String),

    #[error("Sensor name already exists: {0}")]
    SensorNameAlreadyExists(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Aggregation is closed")]
    AggregationClosed,

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
