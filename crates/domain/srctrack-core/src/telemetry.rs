//! Tracking events for embedders that surface warnings outside the log.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackingEvent {
    /// Moves found and committed during a local scan.
    MovesDetected { full: usize, edited: usize },
    /// Move candidates left unpaired because their identity was not unique.
    AmbiguousMoveCandidates { count: usize },
    /// Polling gave up before every expected key appeared.
    PollingTimeout {
        missing: Vec<String>,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
    },
    /// Polling stopped after too many consecutive empty polls.
    PollingEmptyLimit { missing: Vec<String>, polls: u32 },
    /// A legacy tracking file was read and upgraded in memory.
    TrackingFileUpgraded { from: u32, to: u32 },
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TrackingEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: TrackingEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TrackingEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn emit(&self, event: TrackingEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
