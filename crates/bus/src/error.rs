//! Event bus errors

use thiserror::Error;

/// Errors that can occur while delivering notifications
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Failed to deliver event: {0}")]
    DeliveryFailed(String),

    #[error("Port '{name}' failed: {reason}")]
    PortFailed { name: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}
