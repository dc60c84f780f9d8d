//! In-process event bus
//!
//! Fans each event out to the registered notification ports, then to any
//! broadcast subscribers. Nothing is retained: the ledger journal is the
//! record of what happened, the bus only forwards it.

use crate::event::LifecycleEvent;
use crate::port::NotificationPort;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel for in-process subscribers
const CHANNEL_CAPACITY: usize = 256;

/// Event bus for distributing lifecycle events
pub struct EventBus {
    ports: RwLock<Vec<Arc<dyn NotificationPort>>>,
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus with no ports
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            ports: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Create a bus with the given ports already registered
    pub fn with_ports(ports: Vec<Arc<dyn NotificationPort>>) -> Self {
        let bus = Self::new();
        for port in ports {
            bus.register(port);
        }
        bus
    }

    /// Register a notification port
    pub fn register(&self, port: Arc<dyn NotificationPort>) {
        match self.ports.write() {
            Ok(mut ports) => ports.push(port),
            Err(_) => tracing::error!(port = port.name(), "Port registry poisoned"),
        }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of registered ports
    pub fn port_count(&self) -> usize {
        self.ports.read().map(|ports| ports.len()).unwrap_or(0)
    }

    /// Publish an event to every port and subscriber.
    ///
    /// Delivery failures are logged and swallowed.
    pub async fn publish(&self, event: LifecycleEvent) {
        let event_type = event.event_type();
        let ports: Vec<Arc<dyn NotificationPort>> = match self.ports.read() {
            Ok(ports) => ports.clone(),
            Err(_) => {
                tracing::error!(event_type, "Port registry poisoned, event dropped");
                return;
            }
        };

        for port in ports {
            match port.notify(event_type, &event).await {
                Ok(()) => tracing::debug!(port = port.name(), event_type, "Event delivered"),
                Err(e) => tracing::warn!(
                    port = port.name(),
                    event_type,
                    error = %e,
                    "Notification port failed"
                ),
            }
        }

        // No receivers is the normal case outside tests
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
