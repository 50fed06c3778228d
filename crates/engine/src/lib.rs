//! USB mass-storage identity and registry engine
//!
//! Discovers removable USB storage devices, gives each one a stable
//! identifier that survives repeated polls, tracks its mount point and
//! unmounts it on request.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{FakePlatform, create_mock_raw_device};
//! use engine::DeviceEngine;
//!
//! let platform = FakePlatform::new();
//! platform.add_device(create_mock_raw_device(5, 0x1234, 0x5678, None));
//! platform.set_mount("handle-5", "/Volumes/A");
//!
//! let mut engine = DeviceEngine::new(platform);
//! let devices = engine.poll();
//!
//! assert_eq!(devices[0].id.as_str(), "4660-22136-0");
//! assert!(engine.unmount(&devices[0].id).succeeded());
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod host;
pub mod identity;
pub mod registry;
pub mod watch;
pub mod worker;

pub use backend::{PlatformBackend, default_backend};
pub use config::EngineConfig;
pub use engine::{DeviceEngine, EngineOptions, check_filter};
pub use host::HostSession;
pub use identity::IdGenerator;
pub use registry::{DeviceRecord, DeviceRegistry};
pub use watch::{DeviceChange, diff_polls};
pub use worker::{EngineWorkerThread, spawn_engine_worker};
