use domain::{Resource, ResourceKind, ResourceState, ServiceRequest};

#[test]
fn resource_builds_pending() {
    let resource = Resource::new("u1", "n", "X", Default::default(), "");
    assert_eq!(resource.uuid, "u1");
    assert_eq!(resource.type_tag, "X");
    assert_eq!(resource.state, ResourceState::Pending);
}

#[test]
fn resource_deserializes_wire_names() {
    let resource: Resource = serde_json::from_str(
        r#"{"uuid":"u2","name":"mqtt","type":"GENERIC_MQTT","config":{"port":1883}}"#,
    )
    .expect("resource");
    assert_eq!(resource.type_tag, "GENERIC_MQTT");
    assert_eq!(resource.config.get("port").and_then(|v| v.as_u64()), Some(1883));
    assert_eq!(resource.description, "");
}

#[test]
fn resource_kind_parses_plural() {
    assert_eq!(ResourceKind::parse("targets"), Some(ResourceKind::Target));
    assert_eq!(ResourceKind::parse("cecolla"), Some(ResourceKind::Cecolla));
    assert_eq!(ResourceKind::parse("plugins"), None);
}

#[test]
fn service_request_defaults_args() {
    let request: ServiceRequest =
        serde_json::from_str(r#"{"name":"scan","method":"GET"}"#).expect("request");
    assert!(request.args.is_empty());
}
