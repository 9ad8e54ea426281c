use opentelemetry_sdk::trace::SdkTracerProvider;

/// Logging and trace export settings for a service process.
///
/// Span export is switched on by giving an OTLP collector endpoint.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: log_level.into(),
            otlp_endpoint: None,
        }
    }

    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("weather-all-in-one", "info")
    }
}

/// Held until shutdown so buffered spans can be flushed
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
}
