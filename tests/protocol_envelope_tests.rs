//! Wire-shape conformance for the invocation envelope.

use crucible::capability::CapabilitySet;
use crucible::config::Settings;
use crucible::protocol::{
    ToolRequest, ToolResponse, CODE_METHOD_NOT_FOUND, CODE_TOOL_NOT_FOUND, METHOD_INITIALIZE,
    METHOD_TOOLS_LIST,
};
use serde_json::{json, Map, Value};

#[test]
fn request_wire_shape_matches_the_contract() {
    let mut arguments = Map::new();
    arguments.insert("code".to_string(), json!("x = 1"));
    let request = ToolRequest::call("validate_syntax", arguments);
    let wire = serde_json::to_value(&request).unwrap();

    assert_eq!(wire["method"], json!("tools/call"));
    assert_eq!(wire["params"]["name"], json!("validate_syntax"));
    assert_eq!(wire["params"]["arguments"]["code"], json!("x = 1"));
    assert!(wire["id"].is_string());
}

#[test]
fn success_response_wire_shape_matches_the_contract() {
    let response = ToolResponse::content("req-1", &json!({"valid": true}));
    let wire = serde_json::to_value(&response).unwrap();

    assert_eq!(wire["id"], json!("req-1"));
    assert_eq!(wire["result"]["content"][0]["type"], json!("text"));
    assert!(wire["result"]["content"][0]["text"].is_string());
    assert!(wire.get("error").is_none());
}

#[test]
fn error_response_wire_shape_matches_the_contract() {
    let response = ToolResponse::error("req-2", CODE_TOOL_NOT_FOUND, "Tool not found: x");
    let wire = serde_json::to_value(&response).unwrap();

    assert_eq!(wire["id"], json!("req-2"));
    assert_eq!(wire["error"]["code"], json!("TOOL_NOT_FOUND"));
    assert!(wire["error"]["message"].is_string());
    assert!(wire.get("result").is_none());
}

#[test]
fn requests_parse_from_raw_wire_json() {
    let request: ToolRequest = serde_json::from_value(json!({
        "method": "tools/call",
        "params": { "name": "run_linting", "arguments": { "code": "x = 1" } },
        "id": "opaque-17",
    }))
    .unwrap();
    assert_eq!(request.params.name, "run_linting");
    assert_eq!(request.id, "opaque-17");
}

#[tokio::test]
async fn every_default_host_answers_initialize_and_tools_list() {
    let set = CapabilitySet::with_defaults(&Settings::default()).unwrap();
    for host in set.hosts() {
        let init = host
            .handle_request(ToolRequest::method(METHOD_INITIALIZE))
            .await;
        let info = init.result.unwrap();
        assert_eq!(info["serverInfo"]["name"], json!(host.name()));

        let list = host
            .handle_request(ToolRequest::method(METHOD_TOOLS_LIST))
            .await;
        let tools = list.result.unwrap()["tools"].as_array().unwrap().clone();
        assert!(!tools.is_empty(), "{} exposes no tools", host.name());
        for tool in tools {
            assert!(tool["name"].is_string());
            assert!(tool["inputSchema"].is_object());
        }
    }
}

#[tokio::test]
async fn unregistered_tool_always_returns_an_error_envelope() {
    let set = CapabilitySet::with_defaults(&Settings::default()).unwrap();
    for host in set.hosts() {
        let response = host
            .handle_request(ToolRequest::call("no_such_operation", Map::new()))
            .await;
        assert_eq!(response.error.unwrap().code, CODE_TOOL_NOT_FOUND);
    }
}

#[tokio::test]
async fn unknown_method_returns_method_not_found() {
    let set = CapabilitySet::with_defaults(&Settings::default()).unwrap();
    let response = set
        .testing
        .handle_request(ToolRequest::method("resources/list"))
        .await;
    assert_eq!(response.error.unwrap().code, CODE_METHOD_NOT_FOUND);
}

#[tokio::test]
async fn tools_call_payloads_are_valid_json_text_blocks() {
    let set = CapabilitySet::with_defaults(&Settings::default()).unwrap();
    let mut args = Map::new();
    args.insert("code".to_string(), json!("def ok():\n    return 1\n"));
    let response = set
        .testing
        .handle_request(ToolRequest::call("validate_syntax", args))
        .await;
    let text = response.content_text().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["valid"], json!(true));
}
