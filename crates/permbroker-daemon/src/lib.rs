//! permbroker Daemon Library
//!
//! Arbitrates tool permission requests exchanged through a shared directory:
//! - Request watcher polling for request artifacts
//! - Decision memory (tool-level and exact-input)
//! - Decision authority gateway (asynchronous dialog or blocking fallback)
//! - Response writer
//! - Service lifecycle

pub mod gateway;
pub mod permission;
pub mod service;
pub mod store;
pub mod watcher;

pub use service::PermissionService;
