//! Common utilities for usb-drives
//!
//! This crate provides the pieces shared by the registry engine, its
//! platform backends and its tests: the platform capability traits, error
//! handling, the redirectable log sink, and the channel bridge to the
//! registry thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod platform;
pub mod test_utils;

pub use channel::{EngineBridge, EngineCommand, EngineWorker, create_engine_bridge};
pub use error::{Error, Result};
pub use logging::{LogSink, setup_logging};
pub use platform::{Collector, Platform, Unmounter};
