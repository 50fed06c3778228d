//! Host message definitions
//!
//! A host application drives the engine with one JSON request per line and
//! receives one JSON response per line. The method names and argument rules
//! match the host API: `poll`, `get`, `unmount` and `setLogFile`.

use crate::error::{ProtocolError, Result};
use crate::types::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text for a call with too few arguments
pub const WRONG_ARGUMENT_COUNT: &str = "Wrong number of arguments";

/// Error text for a call whose first argument is not a string
pub const EXPECTED_STRING_ARGUMENT: &str = "Expected the first argument to be of type string";

/// Request envelope (host -> engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    /// Opaque correlation value echoed in the response
    #[serde(default)]
    pub id: Value,
    /// Method name
    pub method: String,
    /// Positional arguments
    #[serde(default)]
    pub params: Vec<Value>,
}

impl HostRequest {
    /// Build a request with the given method and parameters
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Response envelope (engine -> host)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    /// Correlation value copied from the request (`null` if unknown)
    pub id: Value,
    /// Call result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    /// Successful response
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response
    pub fn err(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// True if this response carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A validated host call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// Enumerate attached devices
    Poll,
    /// Look up a device by identifier
    Get(DeviceId),
    /// Unmount a device by identifier
    Unmount(DeviceId),
    /// Redirect diagnostic output
    SetLogFile(String),
}

impl HostCall {
    /// Validate a request and turn it into a call
    ///
    /// Extra arguments are ignored; missing or mistyped arguments are the
    /// only errors a host ever sees.
    pub fn from_request(request: &HostRequest) -> Result<Self> {
        match request.method.as_str() {
            "poll" => Ok(HostCall::Poll),
            "get" => first_string(&request.params).map(|s| HostCall::Get(DeviceId(s))),
            "unmount" => first_string(&request.params).map(|s| HostCall::Unmount(DeviceId(s))),
            "setLogFile" => first_string(&request.params).map(HostCall::SetLogFile),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }

    /// Method name of this call
    pub fn method(&self) -> &'static str {
        match self {
            HostCall::Poll => "poll",
            HostCall::Get(_) => "get",
            HostCall::Unmount(_) => "unmount",
            HostCall::SetLogFile(_) => "setLogFile",
        }
    }
}

fn first_string(params: &[Value]) -> Result<String> {
    let first = params
        .first()
        .ok_or_else(|| ProtocolError::InvalidArguments(WRONG_ARGUMENT_COUNT.to_string()))?;

    first
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::InvalidArguments(EXPECTED_STRING_ARGUMENT.to_string()))
}
