//! Fundtrail RPC - inbound operations and CLI orchestrator
//!
//! This crate wires the stores, ledger, state machine and verifier together
//! and exposes the inbound operations used by the `fundtrail` binary.

pub mod commands;
pub mod config;
pub mod context;
pub mod layers;

pub use commands::CommandError;
pub use config::{AppConfig, ConfigError};
pub use context::AppContext;
pub use layers::JournalLayer;
