use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, Reading};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Downstream consumer of completed readings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingHandler: Send + Sync {
    async fn handle_reading(&self, reading: &Reading) -> DomainResult<()>;
}

/// Adapts a plain closure into a [`ReadingHandler`]
pub struct FnReadingHandler<F> {
    handler: F,
}

impl<F> FnReadingHandler<F>
where
    F: Fn(&Reading) -> DomainResult<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> ReadingHandler for FnReadingHandler<F>
where
    F: Fn(&Reading) -> DomainResult<()> + Send + Sync,
{
    async fn handle_reading(&self, reading: &Reading) -> DomainResult<()> {
        (self.handler)(reading)
    }
}

/// Ordered chain of handlers invoked once per emitted reading.
///
/// Handlers run in registration order and the chain stops at the first
/// failure, which is returned to the caller.
#[derive(Default)]
pub struct EmissionSink {
    handlers: Vec<Arc<dyn ReadingHandler>>,
}

impl EmissionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn ReadingHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&Reading) -> DomainResult<()> + Send + Sync + 'static,
    {
        self.with_handler(Arc::new(FnReadingHandler::new(handler)))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    #[instrument(
        name = "emit_reading",
        skip_all,
        fields(sensor_id = %reading.sensor_id, field_count = reading.fields.len())
    )]
    pub async fn emit(&self, reading: &Reading) -> DomainResult<()> {
        if !reading.is_emittable() {
            return Err(DomainError::InvalidInput(
                "reading must carry at least one field and a timestamp".to_string(),
            ));
        }

        for (position, handler) in self.handlers.iter().enumerate() {
            if let Err(e) = handler.handle_reading(reading).await {
                debug!(handler = position, error = %e, "handler failed, stopping chain");
                return Err(e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::domain::{FieldName, SensorId};
    use std::sync::Mutex;

    fn reading() -> Reading {
        Reading::new(SensorId::new_v4(), Utc::now()).with_field(FieldName::Temperature, 20.0)
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&calls);
        let second = Arc::clone(&calls);

        let sink = EmissionSink::new()
            .with_fn(move |_| {
                first.lock().unwrap().push("first");
                Ok(())
            })
            .with_fn(move |_| {
                second.lock().unwrap().push("second");
                Ok(())
            });

        sink.emit(&reading()).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_failure() {
        let mut failing = MockReadingHandler::new();
        failing
            .expect_handle_reading()
            .times(1)
            .returning(|_| Err(DomainError::EmissionRejected("nope".to_string())));

        let mut never_called = MockReadingHandler::new();
        never_called.expect_handle_reading().times(0);

        let sink = EmissionSink::new()
            .with_handler(Arc::new(failing))
            .with_handler(Arc::new(never_called));

        let result = sink.emit(&reading()).await;
        assert!(matches!(result, Err(DomainError::EmissionRejected(_))));
    }

    #[tokio::test]
    async fn test_empty_reading_is_not_emitted() {
        let mut handler = MockReadingHandler::new();
        handler.expect_handle_reading().times(0);

        let sink = EmissionSink::new().with_handler(Arc::new(handler));

        let result = sink.emit(&Reading::new(SensorId::new_v4(), Utc::now())).await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_empty_sink_accepts_readings() {
        let sink = EmissionSink::new();
        assert!(sink.is_empty());
        sink.emit(&reading()).await.unwrap();
    }
}
