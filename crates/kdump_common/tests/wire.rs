use kdump_common::rpc::{RpcMethod, RpcRequest, RpcResponse};
use kdump_common::{CrashDumpEntry, KdumpConfig, KdumpStatus, ReservedMemory, ServiceState};
use serde_json::json;

#[test]
fn test_config_document_field_names() {
    let cfg = KdumpConfig {
        enable: true,
        files_to_save: Some(4),
        delete_old_files: true,
        reserved_memory: ReservedMemory::Megabytes(384),
    };
    assert_eq!(
        serde_json::to_value(&cfg).unwrap(),
        json!({
            "enable": true,
            "files-to-save": 4,
            "delete-old-files": true,
            "reserved-memory": 384
        })
    );

    // Unbounded retention is simply absent
    let unbounded = KdumpConfig {
        files_to_save: None,
        reserved_memory: ReservedMemory::auto(),
        ..cfg
    };
    let value = serde_json::to_value(&unbounded).unwrap();
    assert!(value.get("files-to-save").is_none());
    assert_eq!(value["reserved-memory"], "auto");
}

#[test]
fn test_status_document() {
    let status = KdumpStatus {
        service_state: ServiceState::Error,
        reserved_memory: 0,
        need_reboot: true,
        rebooted_after_system_crash: false,
        crash_dumps: vec![CrashDumpEntry {
            index: 0,
            timestamp: "2024-01-03T15:42:00Z".to_string(),
            path: "/var/crash/202401031542".to_string(),
            size: 4096,
        }],
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["service-state"], "error");
    assert_eq!(value["need-reboot"], true);
    assert_eq!(value["crash-dumps"][0]["path"], "/var/crash/202401031542");

    let back: KdumpStatus = serde_json::from_value(value).unwrap();
    assert_eq!(back, status);
}

#[test]
fn test_request_response_envelope() {
    let req = RpcRequest::new(RpcMethod::GetCrashDmesg, Some(json!({"index": [0, -1]})));
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["method"], "get_crash_dmesg");
    assert_eq!(value["params"]["index"], json!([0, -1]));

    let resp: RpcResponse = serde_json::from_str(
        r#"{"jsonrpc":"2.0","error":{"code":-32011,"message":"index (3) out of range [-2..1]"},"id":"x"}"#,
    )
    .unwrap();
    assert!(resp.result.is_none());
    assert_eq!(resp.error.unwrap().code, -32011);
}
