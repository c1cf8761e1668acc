//! Unit tests for the JSON-RPC message model and error-object constructors.

use agent_conduit::rpc::message::{codes, DecodeError, Message, RequestId, RpcError};
use serde_json::json;

// ── Wire shapes ──────────────────────────────────────────────────────────────

/// A response always carries an explicit `result` member, even for `null`.
#[test]
fn null_result_is_present_on_the_wire() {
    let msg = Message::Response {
        id: RequestId::Num(4),
        result: serde_json::Value::Null,
    };
    let value = msg.to_value();
    let obj = value.as_object().expect("response is an object");

    assert!(
        obj.contains_key("result"),
        "result member must be present even when null"
    );
    assert!(obj["result"].is_null());
}

/// Notifications never carry an id member.
#[test]
fn notifications_have_no_id() {
    let msg = Message::Notification {
        method: "session/update".into(),
        params: json!({"sessionId": "sess_a"}),
    };
    let value = msg.to_value();

    assert!(value.get("id").is_none(), "notification must not carry an id");
    assert!(msg.id().is_none());
}

/// A `null` id on an inbound message means "no id": with a method it is a
/// notification, without one the reply is malformed.
#[test]
fn null_id_counts_as_absent() {
    let as_notification = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "id": null,
        "method": "session/cancel",
        "params": {"sessionId": "sess_a"},
    }))
    .expect("classification must succeed");
    assert!(matches!(as_notification, Message::Notification { .. }));

    let reply = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "id": null,
        "result": {},
    }));
    assert!(matches!(reply, Err(DecodeError::Malformed(_))));
}

/// Ids may be integers or strings; anything else is malformed.
#[test]
fn id_types_are_integer_or_string_only() {
    let float_id = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "id": 1.5,
        "method": "initialize",
    }));
    assert!(matches!(float_id, Err(DecodeError::Malformed(_))));

    let bool_id = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "id": true,
        "method": "initialize",
    }));
    assert!(matches!(bool_id, Err(DecodeError::Malformed(_))));
}

/// A non-string method member is malformed.
#[test]
fn non_string_method_is_malformed() {
    let msg = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": 42,
    }));
    assert!(matches!(msg, Err(DecodeError::Malformed(_))));
}

/// Missing params deserializes as `Value::Null` and is omitted on encode.
#[test]
fn absent_params_stay_absent() {
    let msg = Message::from_value(&json!({
        "jsonrpc": "2.0",
        "method": "session/cancel",
    }))
    .expect("classification must succeed");

    let Message::Notification { params, .. } = &msg else {
        panic!("expected a notification");
    };
    assert!(params.is_null());
    assert!(msg.to_value().get("params").is_none());
}

// ── Error objects ────────────────────────────────────────────────────────────

/// The evidenced code set, plus the standard internal-error code.
#[test]
fn error_code_constants() {
    assert_eq!(codes::INVALID_PARAMS, -32602);
    assert_eq!(codes::METHOD_NOT_FOUND, -32601);
    assert_eq!(codes::NOT_INITIALIZED, -32000);
    assert_eq!(codes::INTERNAL_ERROR, -32603);
}

/// `invalid_params` carries the field detail as a string payload.
#[test]
fn invalid_params_carries_detail() {
    let err = RpcError::invalid_params("protocolVersion must be an integer");
    assert_eq!(err.code, codes::INVALID_PARAMS);
    assert_eq!(err.message, "Invalid params");
    assert_eq!(
        err.data,
        Some(json!("protocolVersion must be an integer"))
    );
}

/// `not_initialized` names the missing call in its detail.
#[test]
fn not_initialized_mentions_initialize() {
    let err = RpcError::not_initialized();
    assert_eq!(err.code, codes::NOT_INITIALIZED);
    assert_eq!(err.message, "Not initialized");
    let detail = err.data.expect("detail must be present");
    assert!(
        detail.as_str().expect("detail is a string").contains("initialize"),
        "detail must mention 'initialize': {detail}"
    );
}

/// `method_not_found` names the unknown method.
#[test]
fn method_not_found_names_the_method() {
    let err = RpcError::method_not_found("session/load");
    assert_eq!(err.code, codes::METHOD_NOT_FOUND);
    let detail = err.data.expect("detail must be present");
    assert!(detail.as_str().expect("detail is a string").contains("session/load"));
}
