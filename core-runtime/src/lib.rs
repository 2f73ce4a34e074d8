//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the blob core:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge wiring
//! - Transfer event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the blob core and the
//! service facade depend on. It establishes the logging conventions, the
//! fail-fast configuration builder, and the broadcast channel that mirrors
//! transfer progress to any number of observers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BlobConfig, BlobConfigBuilder, TransferDefaults};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SessionEvent, TransferEvent};
