//! `permbroker` Core Library
//!
//! Shared functionality for `permbroker` components:
//! - Request/response artifact protocol for the shared permission directory
//! - Verdict wire codes
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{Inputs, PermissionReply, PermissionRequest, Verdict};
