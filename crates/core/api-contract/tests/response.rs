use api_contract::{ApiResponse, ResourceDto};

#[test]
fn api_response_success() {
    let response = ApiResponse::success("ok");
    assert!(response.success);
    assert!(response.data.is_some());
    assert!(response.error.is_none());
}

#[test]
fn api_response_error() {
    let response = ApiResponse::<()>::error("RUNTIME.ERROR", "worker error: connect refused");
    assert!(!response.success);
    assert!(response.data.is_none());
    let error = response.error.expect("error");
    assert_eq!(error.code, "RUNTIME.ERROR");
}

#[test]
fn api_response_parses_client_side() {
    let payload = r#"{"success":true,"data":[{"uuid":"d1","name":"meter","type":"GENERIC_MODBUS_MASTER",
        "kind":"device","state":"DOWN","description":"","config":{"port":502}}],"error":null}"#;
    let response: ApiResponse<Vec<ResourceDto>> = serde_json::from_str(payload).expect("parse");
    let list = response.data.expect("data");
    assert_eq!(list[0].type_tag, "GENERIC_MODBUS_MASTER");
    assert_eq!(list[0].config["port"], 502);
}
