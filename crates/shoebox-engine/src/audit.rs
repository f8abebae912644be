//! Audit sinks
//!
//! `shoebox-store` persists audit events to SQLite. The sinks here log them,
//! keep them in memory for tests, or fan them out to several sinks.

use shoebox_domain::{AuditEvent, AuditSink};
use std::sync::{Arc, Mutex};

/// Writes each event as a structured `tracing` line under the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event {
            AuditEvent::Transition(record) => tracing::info!(
                target: "audit",
                photo_id = %record.photo_id,
                from_tier = record.from_tier.as_str(),
                to_tier = record.to_tier.as_str(),
                rule_id = ?record.rule_id,
                timestamp = record.timestamp,
                "transition"
            ),
            AuditEvent::FreezeChanged {
                photo_id,
                frozen,
                timestamp,
            } => tracing::info!(
                target: "audit",
                photo_id = %photo_id,
                frozen = *frozen,
                timestamp = *timestamp,
                "{}",
                event.kind()
            ),
            AuditEvent::Failure {
                photo_id,
                kind,
                detail,
                timestamp,
            } => tracing::error!(
                target: "audit",
                photo_id = %photo_id,
                kind = kind.as_str(),
                timestamp = *timestamp,
                "failure: {}",
                detail
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events of one kind (`transition`, `freeze`, `integrity`, ...)
    pub fn events_of_kind(&self, kind: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Delivers every event to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    /// Create a fan-out over `sinks`
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
