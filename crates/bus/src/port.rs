//! Notification port trait and built-in ports

use crate::error::BusError;
use crate::event::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Mutex;

/// Outbound port for lifecycle notifications
///
/// The core calls `notify` after every state transition and ledger mutation.
/// Implementations forward events to users (toast, push, email). A port error
/// is logged by the bus and never rolls back the operation that produced it.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Port name (for logging)
    fn name(&self) -> &str;

    /// Deliver one event
    async fn notify(&self, event_type: &str, event: &LifecycleEvent) -> Result<(), BusError>;
}

/// Port that writes every event to the tracing log
pub struct LogPort;

#[async_trait]
impl NotificationPort for LogPort {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event_type: &str, event: &LifecycleEvent) -> Result<(), BusError> {
        if event.is_escalation() {
            tracing::error!(event_type, ?event, "Ledger escalation");
        } else {
            tracing::info!(event_type, timestamp = %event.timestamp(), "Lifecycle event");
        }
        Ok(())
    }
}

/// Port that keeps every delivered event in memory (for testing)
#[derive(Default)]
pub struct MemoryPort {
    events: Mutex<Vec<(String, LifecycleEvent)>>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events delivered so far, in delivery order
    pub fn events(&self) -> Vec<(String, LifecycleEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Event type strings delivered so far
    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|(kind, _)| kind).collect()
    }

    /// Number of delivered events with the given type
    pub fn count(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|(kind, _)| kind == event_type)
            .count()
    }
}

#[async_trait]
impl NotificationPort for MemoryPort {
    fn name(&self) -> &str {
        "memory"
    }

    async fn notify(&self, event_type: &str, event: &LifecycleEvent) -> Result<(), BusError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| BusError::DeliveryFailed("memory port poisoned".to_string()))?;
        events.push((event_type.to_string(), event.clone()));
        Ok(())
    }
}
