//! Hub Configuration File Tests
//!
//! Loads TOML and JSON files from disk and checks:
//! - Endpoints are built and bound to the right keys
//! - Errors name the failing endpoint and field

use std::io::Write;

use otbridge_core::{MessageId, MessageType};
use otbridge_devices::{ConfigError, EndpointHandle, EndpointKind, HubConfig};
use tempfile::NamedTempFile;

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const BOILER_TOML: &str = r#"
[[endpoint]]
name = "ch_active"
platform = "binary_sensor"
message_id = "STATUS"
read_callback = "flag1_lb"

[[endpoint]]
name = "flame_on"
platform = "binary_sensor"
message_id = "STATUS"
read_callback = { callback = "flag", position = 3 }

[[endpoint]]
name = "modulation"
platform = "sensor"
message_id = "MODULATION_LEVEL"
read_callback = "q7_8"

[[endpoint]]
name = "ch_enable"
platform = "switch"
message_id = "STATUS"
message_type = "READ_DATA"
write_callback = "flag0_hb"

[[endpoint]]
name = "dhw_setpoint"
platform = "number"
message_id = 56
write_callback = "q7_8"
min_value = 30.0
max_value = 60.0
step = 0.5
"#;

#[test]
fn test_load_toml_and_route() {
    let file = write_config(".toml", BOILER_TOML);
    let assembly = HubConfig::load(file.path()).unwrap().build().unwrap();

    assert_eq!(assembly.bindings.len(), 5);
    assert_eq!(assembly.hub.endpoint_count(), 5);

    // Status response: CH active, flame on
    let readers = assembly
        .hub
        .deliver(MessageId::STATUS, MessageType::ReadData, 0x000A);
    assert_eq!(readers, 2);
    match assembly.endpoint("flame_on") {
        Some(EndpointHandle::BinarySensor(sensor)) => assert_eq!(sensor.state(), Some(true)),
        other => panic!("unexpected endpoint: {:?}", other),
    }

    // CH enable goes into the high byte of the status request
    let ch_enable = assembly.endpoint("ch_enable").unwrap();
    assert!(assembly.binding("ch_enable").unwrap().assumed_state());
    ch_enable.set(true.into()).unwrap();
    assert_eq!(
        assembly.hub.compose(MessageId::STATUS, MessageType::ReadData, 0),
        0x0100
    );
}

#[test]
fn test_number_settings_from_file() {
    let file = write_config(".toml", BOILER_TOML);
    let assembly = HubConfig::load(file.path()).unwrap().build().unwrap();

    let Some(EndpointHandle::Number(number)) = assembly.endpoint("dhw_setpoint") else {
        panic!("dhw_setpoint is not a number");
    };
    assert_eq!(number.min_value(), 30.0);
    assert_eq!(number.max_value(), 60.0);
    assert_eq!(number.step(), 0.5);
    assert!(number.control(65.0).is_err());
    number.control(45.5).unwrap();
    assert_eq!(
        assembly
            .hub
            .compose(MessageId::DHW_SETPOINT, MessageType::WriteData, 0),
        0x2D80
    );
}

#[test]
fn test_load_json_by_extension() {
    let file = write_config(
        ".json",
        r#"{
            "reject_overlaps": true,
            "endpoint": [
                {"name": "dhw_temp", "platform": "sensor", "message_id": "dhw_temp",
                 "read_callback": "q7_8"},
                {"name": "fault_code", "platform": "sensor", "message_id": 5,
                 "read_callback": {"position": 0, "length": 8}}
            ]
        }"#,
    );
    let config = HubConfig::load(file.path()).unwrap();
    assert!(config.reject_overlaps);
    let assembly = config.build().unwrap();
    let kinds: Vec<_> = assembly.endpoints().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EndpointKind::Sensor, EndpointKind::Sensor]);

    assembly.hub.deliver(MessageId(5), MessageType::ReadData, 0x1234);
    match assembly.endpoint("fault_code") {
        Some(EndpointHandle::Sensor(sensor)) => assert_eq!(sensor.state(), Some(52.0)),
        other => panic!("unexpected endpoint: {:?}", other),
    }
}

#[test]
fn test_error_names_endpoint_and_field() {
    let file = write_config(
        ".toml",
        r#"
        [[endpoint]]
        name = "boiler_flame"
        platform = "binary_sensor"
        message_id = 0
        read_callback = "flag99"
        "#,
    );
    let err = HubConfig::load(file.path()).unwrap().build().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("boiler_flame"), "{msg}");
    assert!(msg.contains("read_callback"), "{msg}");
    assert!(msg.contains("flag99"), "{msg}");
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = HubConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_unknown_platform_fails_parse() {
    let err = HubConfig::from_toml_str(
        r#"
        [[endpoint]]
        name = "x"
        platform = "climate"
        message_id = 0
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
