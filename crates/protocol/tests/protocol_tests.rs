//! Integration tests for the host line protocol
//!
//! Tests request validation, response shapes and snapshot encoding as a
//! host application would see them on the wire.

use protocol::{
    DeviceId, DeviceSnapshot, EXPECTED_STRING_ARGUMENT, HostCall, HostRequest, HostResponse,
    ProtocolError, WRONG_ARGUMENT_COUNT, decode_request, decode_response, encode_line, read_line,
};
use serde_json::{Value, json};
use std::io::Cursor;

fn make_snapshot(id: &str, mount: Option<&str>) -> DeviceSnapshot {
    DeviceSnapshot {
        id: DeviceId::from(id),
        location_id: 0x1410_0000,
        vendor_id: 0x0781,
        product_id: 0x5583,
        product: Some("Ultra Fit".to_string()),
        serial_number: Some("4C530001".to_string()),
        vendor: Some("SanDisk".to_string()),
        mount_point: mount.map(str::to_string),
    }
}

mod request_validation {
    use super::*;

    fn call(line: &str) -> Result<HostCall, ProtocolError> {
        let request = decode_request(line)?;
        HostCall::from_request(&request)
    }

    #[test]
    fn test_all_methods_accept_valid_arguments() {
        assert_eq!(call(r#"{"method":"poll"}"#).unwrap(), HostCall::Poll);
        assert_eq!(
            call(r#"{"method":"get","params":["1-2-0"]}"#).unwrap(),
            HostCall::Get(DeviceId::from("1-2-0"))
        );
        assert_eq!(
            call(r#"{"method":"unmount","params":["1-2-0"]}"#).unwrap(),
            HostCall::Unmount(DeviceId::from("1-2-0"))
        );
        assert_eq!(
            call(r#"{"method":"setLogFile","params":["usb-driver.log"]}"#).unwrap(),
            HostCall::SetLogFile("usb-driver.log".to_string())
        );
    }

    #[test]
    fn test_missing_argument_messages() {
        for method in ["get", "unmount", "setLogFile"] {
            let line = format!(r#"{{"method":"{}","params":[]}}"#, method);
            let err = call(&line).unwrap_err();
            assert_eq!(err.to_string(), WRONG_ARGUMENT_COUNT, "method {}", method);
        }
    }

    #[test]
    fn test_non_string_argument_messages() {
        for arg in ["1", "null", "true", "{}", "[]"] {
            let line = format!(r#"{{"method":"get","params":[{}]}}"#, arg);
            let err = call(&line).unwrap_err();
            assert_eq!(err.to_string(), EXPECTED_STRING_ARGUMENT, "arg {}", arg);
        }
    }

    #[test]
    fn test_extra_arguments_ignored() {
        assert_eq!(
            call(r#"{"method":"get","params":["a-b-0", 1, 2]}"#).unwrap(),
            HostCall::Get(DeviceId::from("a-b-0"))
        );
    }

    #[test]
    fn test_method_names_are_case_sensitive() {
        assert!(matches!(
            call(r#"{"method":"Poll"}"#),
            Err(ProtocolError::UnknownMethod(_))
        ));
        assert!(matches!(
            call(r#"{"method":"setlogfile","params":["x"]}"#),
            Err(ProtocolError::UnknownMethod(_))
        ));
    }
}

mod responses {
    use super::*;

    #[test]
    fn test_device_list_response_shape() {
        let devices = vec![
            make_snapshot("1921-21891-4C530001-0", Some("/media/usb")),
            make_snapshot("1921-21891-4C530001-1", None),
        ];
        let response = HostResponse::ok(json!(5), serde_json::to_value(&devices).unwrap());

        let line = encode_line(&response).unwrap();
        let decoded = decode_response(std::str::from_utf8(&line).unwrap()).unwrap();
        let result = decoded.result.unwrap();

        assert_eq!(decoded.id, json!(5));
        assert_eq!(result.as_array().unwrap().len(), 2);
        assert_eq!(result[0]["mount"], "/media/usb");
        assert!(result[1]["mount"].is_null());
        assert_eq!(result[0]["manufacturer"], "SanDisk");
    }

    #[test]
    fn test_not_found_is_null_result_not_error() {
        let response = HostResponse::ok(json!("req-1"), Value::Null);
        let line = encode_line(&response).unwrap();
        let text = std::str::from_utf8(&line).unwrap();

        assert!(text.contains("\"result\":null"));
        assert!(!text.contains("error"));
    }

    #[test]
    fn test_snapshot_deserializes_from_wire() {
        let wire = json!({
            "id": "1921-21891-0",
            "locationId": 3,
            "vendorId": 1921,
            "productId": 21891,
            "product": null,
            "serialNumber": null,
            "manufacturer": "SanDisk",
            "mount": "/Volumes/UNTITLED"
        });

        let snapshot: DeviceSnapshot = serde_json::from_value(wire).unwrap();
        assert_eq!(snapshot.id.as_str(), "1921-21891-0");
        assert_eq!(snapshot.vendor.as_deref(), Some("SanDisk"));
        assert!(snapshot.product.is_none());
        assert!(snapshot.is_mounted());
    }
}

mod framing {
    use super::*;

    #[test]
    fn test_multiple_requests_in_one_stream() {
        let mut stream = Vec::new();
        stream.extend(encode_line(&HostRequest::new(1, "poll", vec![])).unwrap());
        stream.extend(encode_line(&HostRequest::new(2, "get", vec![json!("x")])).unwrap());

        let mut cursor = Cursor::new(stream);
        let first = decode_request(&read_line(&mut cursor).unwrap().unwrap()).unwrap();
        let second = decode_request(&read_line(&mut cursor).unwrap().unwrap()).unwrap();

        assert_eq!(first.method, "poll");
        assert_eq!(second.id, json!(2));
        assert!(read_line(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_blank_line_is_malformed() {
        assert!(matches!(
            decode_request(""),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }
}
