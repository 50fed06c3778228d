//! Host binding
//!
//! Serves the engine to a host application over a line-delimited JSON
//! stream, one request per line and one response per request. Only invalid
//! host input is reported as an error; engine failures are logged and
//! absorbed.

use anyhow::Result;
use common::{EngineBridge, LogSink};
use protocol::{
    HostCall, HostResponse, ProtocolError, decode_request, read_line_async, write_line_async,
};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// One host connection's view of the engine
#[derive(Clone)]
pub struct HostSession {
    bridge: EngineBridge,
    log: LogSink,
}

impl HostSession {
    /// Session over an engine bridge and the process log sink
    pub fn new(bridge: EngineBridge, log: LogSink) -> Self {
        Self { bridge, log }
    }

    /// Serve requests until the reader reaches end of input
    ///
    /// Returns the number of requests answered.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Serving host requests");
        let mut handled = 0u64;

        loop {
            let response = match read_line_async(reader).await {
                Ok(None) => break,
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => self.handle_line(&line).await,
                Err(e @ ProtocolError::LineTooLarge { .. }) => {
                    warn!("Rejected host request: {}", e);
                    HostResponse::err(Value::Null, e.to_string())
                }
                Err(ProtocolError::InvalidUtf8(e)) => {
                    let e = ProtocolError::MalformedRequest(e.to_string());
                    warn!("{}", e);
                    HostResponse::err(Value::Null, e.to_string())
                }
                Err(e) => return Err(e.into()),
            };

            write_line_async(writer, &response).await?;
            handled += 1;
        }

        info!("Host closed input after {} request(s)", handled);
        Ok(handled)
    }

    /// Answer one request line
    pub async fn handle_line(&self, line: &str) -> HostResponse {
        let request = match decode_request(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("{}", e);
                return HostResponse::err(Value::Null, e.to_string());
            }
        };

        match HostCall::from_request(&request) {
            Ok(call) => {
                debug!("Host call: {}", call.method());
                self.dispatch(request.id, call).await
            }
            Err(e) => {
                debug!("Invalid host call {}: {}", request.method, e);
                HostResponse::err(request.id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, id: Value, call: HostCall) -> HostResponse {
        let result = match call {
            HostCall::Poll => self.bridge.poll().await.map(|d| to_value(&d)),
            HostCall::Get(device) => self.bridge.get(device).await.map(|d| to_value(&d)),
            HostCall::Unmount(device) => self
                .bridge
                .unmount(device)
                .await
                .map(|outcome| Value::Bool(outcome.succeeded())),
            HostCall::SetLogFile(path) => {
                // Failure is already logged and the previous sink kept
                let _ = self.log.set_log_file(&path);
                Ok(Value::Null)
            }
        };

        match result {
            Ok(value) => HostResponse::ok(id, value),
            Err(e) => {
                error!("Engine unavailable: {}", e);
                HostResponse::err(id, e.to_string())
            }
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!("Failed to serialize host result: {}", e);
        Value::Null
    })
}
