//! Integration tests for the host binding
//!
//! Runs a [`HostSession`] against a registry worker backed by the scripted
//! platform and checks the line protocol end to end.
//!
//! Run with: `cargo test -p engine --test host_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, FakePlatform, with_timeout};
use common::{EngineBridge, LogSink, create_engine_bridge};
use engine::{DeviceEngine, HostSession, spawn_engine_worker};
use protocol::{
    EXPECTED_STRING_ARGUMENT, HostResponse, MAX_LINE_SIZE, RawDevice, WRONG_ARGUMENT_COUNT,
};
use serde_json::{Value, json};
use std::thread::JoinHandle;
use tokio::io::BufReader;

struct Harness {
    platform: FakePlatform,
    bridge: EngineBridge,
    session: HostSession,
    log: LogSink,
    worker: Option<JoinHandle<DeviceEngine<FakePlatform>>>,
}

impl Harness {
    fn new() -> Self {
        let platform = FakePlatform::new();
        platform.add_device(RawDevice {
            location_id: 5,
            vendor_id: 0x1234,
            product_id: 0x5678,
            serial_number: None,
            product: Some("Drive A".to_string()),
            vendor: Some("Acme".to_string()),
            mount_handle: Some("H1".to_string()),
        });
        platform.set_mount("H1", "/Volumes/A");

        let (bridge, worker) = create_engine_bridge();
        let handle = spawn_engine_worker(worker, DeviceEngine::new(platform.clone())).unwrap();
        let log = LogSink::stderr();
        let session = HostSession::new(bridge.clone(), log.clone());

        Self {
            platform,
            bridge,
            session,
            log,
            worker: Some(handle),
        }
    }

    async fn call(&self, request: Value) -> HostResponse {
        with_timeout(
            DEFAULT_TEST_TIMEOUT,
            self.session.handle_line(&request.to_string()),
        )
        .await
        .expect("host call timed out")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.bridge.shutdown_blocking();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

mod methods {
    use super::*;

    #[tokio::test]
    async fn test_poll_returns_snapshots() {
        let harness = Harness::new();

        let response = harness
            .call(json!({"id": 1, "method": "poll", "params": []}))
            .await;

        assert_eq!(response.id, json!(1));
        let result = response.result.unwrap();
        assert_eq!(
            result,
            json!([{
                "id": "4660-22136-0",
                "locationId": 5,
                "vendorId": 4660,
                "productId": 22136,
                "product": "Drive A",
                "serialNumber": null,
                "manufacturer": "Acme",
                "mount": "/Volumes/A"
            }])
        );
    }

    #[tokio::test]
    async fn test_get_known_and_unknown() {
        let harness = Harness::new();
        harness.call(json!({"id": 1, "method": "poll"})).await;

        let known = harness
            .call(json!({"id": 2, "method": "get", "params": ["4660-22136-0"]}))
            .await;
        assert_eq!(known.result.unwrap()["mount"], "/Volumes/A");

        let unknown = harness
            .call(json!({"id": 3, "method": "get", "params": ["does-not-exist"]}))
            .await;
        assert!(!unknown.is_error());
        assert_eq!(unknown.result, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_unmount_returns_bool() {
        let harness = Harness::new();
        harness.call(json!({"id": 1, "method": "poll"})).await;

        let first = harness
            .call(json!({"id": 2, "method": "unmount", "params": ["4660-22136-0"]}))
            .await;
        assert_eq!(first.result, Some(json!(true)));
        assert_eq!(harness.platform.unmount_calls(), vec!["/Volumes/A".to_string()]);

        let second = harness
            .call(json!({"id": 3, "method": "unmount", "params": ["4660-22136-0"]}))
            .await;
        assert_eq!(second.result, Some(json!(false)));

        let unknown = harness
            .call(json!({"id": 4, "method": "unmount", "params": ["nope"]}))
            .await;
        assert_eq!(unknown.result, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_set_log_file() {
        let harness = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usb-driver.log");

        let response = harness
            .call(json!({"id": 1, "method": "setLogFile", "params": [path.to_str().unwrap()]}))
            .await;

        assert_eq!(response.result, Some(Value::Null));
        assert_eq!(harness.log.current_file(), Some(path));
    }

    #[tokio::test]
    async fn test_set_log_file_failure_is_not_an_error() {
        let harness = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("missing").join("x.log");

        let response = harness
            .call(json!({"id": 1, "method": "setLogFile", "params": [bad.to_str().unwrap()]}))
            .await;

        assert!(!response.is_error());
        assert_eq!(harness.log.current_file(), None);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn test_missing_argument() {
        let harness = Harness::new();
        let response = harness.call(json!({"id": 7, "method": "get"})).await;

        assert_eq!(response.id, json!(7));
        assert_eq!(response.error.as_deref(), Some(WRONG_ARGUMENT_COUNT));
    }

    #[tokio::test]
    async fn test_non_string_argument() {
        let harness = Harness::new();
        let response = harness
            .call(json!({"id": 8, "method": "unmount", "params": [42]}))
            .await;

        assert_eq!(response.error.as_deref(), Some(EXPECTED_STRING_ARGUMENT));
        assert!(harness.platform.unmount_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let harness = Harness::new();
        let response = harness.call(json!({"id": 9, "method": "format"})).await;

        assert_eq!(response.error.as_deref(), Some("Unknown method: format"));
    }

    #[tokio::test]
    async fn test_malformed_line() {
        let harness = Harness::new();
        let response = harness.session.handle_line("{not json").await;

        assert_eq!(response.id, Value::Null);
        assert!(
            response
                .error
                .as_deref()
                .unwrap()
                .starts_with("Malformed request")
        );
    }
}

mod serve_loop {
    use super::*;

    #[tokio::test]
    async fn test_serve_until_eof() {
        let harness = Harness::new();
        let input = concat!(
            r#"{"id":1,"method":"poll","params":[]}"#,
            "\n\n",
            r#"{"id":2,"method":"unmount","params":["4660-22136-0"]}"#,
            "\n",
            r#"{"id":3,"method":"get","params":["4660-22136-0"]}"#,
            "\n",
        );
        let mut reader = BufReader::new(input.as_bytes());
        let mut output: Vec<u8> = Vec::new();

        let handled = with_timeout(
            DEFAULT_TEST_TIMEOUT,
            harness.session.serve(&mut reader, &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(handled, 3);

        let responses: Vec<HostResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].result.as_ref().unwrap()[0]["id"], "4660-22136-0");
        assert_eq!(responses[1].result, Some(json!(true)));
        assert_eq!(responses[2].result.as_ref().unwrap()["mount"], Value::Null);
    }

    async fn serve_bytes(harness: &Harness, input: &[u8]) -> (u64, Vec<HostResponse>) {
        let mut reader = BufReader::new(input);
        let mut output: Vec<u8> = Vec::new();

        let handled = with_timeout(
            DEFAULT_TEST_TIMEOUT,
            harness.session.serve(&mut reader, &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        let responses = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (handled, responses)
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_serving() {
        let harness = Harness::new();
        let mut input = b"{\"id\":1,\"method\":\"get\",\"params\":[\"\xff\"]}\n".to_vec();
        input.extend_from_slice(b"{\"id\":2,\"method\":\"poll\"}\n");

        let (handled, responses) = serve_bytes(&harness, &input).await;

        assert_eq!(handled, 2);
        assert_eq!(responses[0].id, Value::Null);
        assert!(
            responses[0]
                .error
                .as_deref()
                .unwrap()
                .starts_with("Malformed request")
        );
        assert_eq!(responses[1].id, json!(2));
        assert_eq!(responses[1].result.as_ref().unwrap()[0]["id"], "4660-22136-0");
    }

    #[tokio::test]
    async fn test_oversized_line_gets_one_response() {
        let harness = Harness::new();
        let mut input = vec![b'x'; 2 * MAX_LINE_SIZE];
        input.push(b'\n');
        input.extend_from_slice(b"{\"id\":1,\"method\":\"poll\"}\n");

        let (handled, responses) = serve_bytes(&harness, &input).await;

        assert_eq!(handled, 2);
        assert_eq!(responses.len(), 2);
        assert!(
            responses[0]
                .error
                .as_deref()
                .unwrap()
                .starts_with("Line too large")
        );
        assert_eq!(responses[1].id, json!(1));
        assert!(!responses[1].is_error());
    }

    #[tokio::test]
    async fn test_serve_empty_input() {
        let harness = Harness::new();
        let mut reader = BufReader::new(&b""[..]);
        let mut output: Vec<u8> = Vec::new();

        let handled = harness
            .session
            .serve(&mut reader, &mut output)
            .await
            .unwrap();

        assert_eq!(handled, 0);
        assert!(output.is_empty());
    }
}
