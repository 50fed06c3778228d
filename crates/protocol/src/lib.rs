//! Protocol library for usb-drives
//!
//! This crate defines the device types exchanged between the registry engine,
//! its platform backends and host applications, plus the line-delimited JSON
//! format hosts use to drive the engine.
//!
//! # Example
//!
//! ```
//! use protocol::{HostCall, HostRequest, decode_request, encode_line};
//! use serde_json::json;
//!
//! let req = HostRequest::new(1, "get", vec![json!("4660-22136-0")]);
//! let line = encode_line(&req).unwrap();
//!
//! let decoded = decode_request(std::str::from_utf8(&line).unwrap()).unwrap();
//! let call = HostCall::from_request(&decoded).unwrap();
//! assert_eq!(call.method(), "get");
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{
    MAX_LINE_SIZE, decode_line, decode_request, decode_response, encode_line, read_line,
    write_line,
};

#[cfg(feature = "async")]
pub use codec::{read_line_async, write_line_async};
pub use error::{ProtocolError, Result};
pub use messages::{
    EXPECTED_STRING_ARGUMENT, HostCall, HostRequest, HostResponse, WRONG_ARGUMENT_COUNT,
};
pub use types::{DeviceId, DeviceSnapshot, RawDevice, UnmountOutcome};
