//! Event telemetry
//!
//! The engine reports authorization attempts, cycle outcomes, and synthetic fills
//! as named events with a small property bag. Telemetry is informed, never
//! consulted: a sink that fails to deliver an event only produces a log line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Event names emitted by the pipeline
pub mod events {
    pub const HEALTH_AUTHORIZATION: &str = "health_authorization";
    pub const FETCH_CYCLE: &str = "fetch_cycle";
    pub const SYNTHETIC_FILL: &str = "synthetic_fill";
}

/// Telemetry delivery failure
#[derive(Debug, Error)]
#[error("telemetry delivery failed: {0}")]
pub struct TelemetryError(pub String);

/// Named event with string properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn page(self, page: impl Into<String>) -> Self {
        self.with_property("page", page)
    }

    pub fn category(self, category: impl Into<String>) -> Self {
        self.with_property("category", category)
    }

    pub fn outcome(self, outcome: impl Into<String>) -> Self {
        self.with_property("outcome", outcome)
    }

    pub fn error(self, error: impl ToString) -> Self {
        self.with_property("error", error.to_string())
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync {
    fn track(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Sink that writes events to the `tracing` log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn track(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        info!(event = %event.name, properties = ?event.properties, "telemetry");
        Ok(())
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn track(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Send an event, logging delivery failures instead of returning them
pub fn emit(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(e) = sink.track(&event) {
        warn!(event = %event.name, "{e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn track(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError("collector offline".to_string()))
        }
    }

    #[test]
    fn test_event_builder() {
        let event = TelemetryEvent::new(events::HEALTH_AUTHORIZATION)
            .page("main")
            .category("health")
            .outcome("denied")
            .error("user declined");

        assert_eq!(event.property("page"), Some("main"));
        assert_eq!(event.property("outcome"), Some("denied"));
        assert_eq!(event.property("error"), Some("user declined"));
        assert_eq!(event.property("missing"), None);
    }

    #[test]
    fn test_emit_swallows_failures() {
        emit(&BrokenSink, TelemetryEvent::new(events::FETCH_CYCLE));
        emit(&NoopTelemetry, TelemetryEvent::new(events::FETCH_CYCLE));
        emit(&TracingTelemetry, TelemetryEvent::new(events::SYNTHETIC_FILL));
    }
}
