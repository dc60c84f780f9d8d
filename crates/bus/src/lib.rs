//! Fundtrail Event Bus - lifecycle notifications
//!
//! The core calls the bus on every request state transition and every ledger
//! mutation. Delivery (toast, push, email) belongs to the registered
//! [`NotificationPort`] implementations, not to the core.
//!
//! # Features
//! - `NotificationPort` trait for external delivery
//! - Async fan-out to ports; port failures are logged, never propagated
//! - tokio broadcast channel for in-process subscribers

pub mod channel;
pub mod error;
pub mod event;
pub mod port;

pub use channel::EventBus;
pub use error::BusError;
pub use event::LifecycleEvent;
pub use port::{LogPort, MemoryPort, NotificationPort};
