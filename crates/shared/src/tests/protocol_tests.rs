use super::*;
use serde_json::json;

#[test]
fn join_request_uses_type_and_payload_envelope() {
    let request = ClientRequest::decode(
        &json!({
            "type": "join",
            "payload": { "session_key": "abc", "participant_name": "alice" }
        })
        .to_string(),
    )
    .expect("decode");

    assert_eq!(
        request,
        ClientRequest::Join {
            session_key: SessionKey::from("abc"),
            participant_name: ParticipantName::from("alice"),
        }
    );
}

#[test]
fn leave_room_needs_no_payload() {
    let request = ClientRequest::decode(r#"{"type":"leaveRoom"}"#).expect("decode");
    assert_eq!(request, ClientRequest::LeaveRoom);
    assert_eq!(request.kind(), "leaveRoom");
}

#[test]
fn compile_code_version_hint_is_optional() {
    let request = ClientRequest::decode(
        &json!({
            "type": "compileCode",
            "payload": { "session_key": "abc", "code": "print(1)", "language": "python" }
        })
        .to_string(),
    )
    .expect("decode");

    let ClientRequest::CompileCode { version_hint, .. } = request else {
        panic!("expected compileCode");
    };
    assert_eq!(version_hint, None);
}

#[test]
fn unknown_language_mode_is_malformed() {
    let err = ClientRequest::decode(
        &json!({
            "type": "languageChange",
            "payload": { "session_key": "abc", "language": "cobol" }
        })
        .to_string(),
    )
    .expect_err("unknown mode");
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn membership_update_serializes_null_for_leave() {
    let event = ServerEvent::UserJoined {
        joined: None,
        members: vec![ParticipantName::from("bob")],
    };
    let value: serde_json::Value =
        serde_json::from_str(&event.encode().expect("encode")).expect("json");

    assert_eq!(value["type"], "userJoined");
    assert!(value["payload"]["joined"].is_null());
    assert_eq!(value["payload"]["members"], json!(["bob"]));
}

#[test]
fn code_response_parses_service_payload() {
    let event = ServerEvent::decode(
        &json!({
            "type": "codeResponse",
            "payload": {
                "language": "python",
                "version": "3.10.0",
                "run": { "stdout": "1\n", "stderr": "", "output": "1\n", "code": 0, "signal": null }
            }
        })
        .to_string(),
    )
    .expect("decode");

    let ServerEvent::CodeResponse(result) = event else {
        panic!("expected codeResponse");
    };
    assert_eq!(result.output(), "1\n");
    assert_eq!(result.run.code, Some(0));
    assert!(!result.is_failure());
}

#[test]
fn failure_result_carries_fixed_prefix() {
    let result = ExecutionResult::failure("connection refused");
    assert_eq!(result.output(), "Failed to execute code.\nconnection refused");
    assert!(result.is_failure());
}

#[test]
fn language_mode_parse_is_case_insensitive() {
    assert_eq!(LanguageMode::parse("Python"), Some(LanguageMode::Python));
    assert_eq!(LanguageMode::parse(" cpp "), Some(LanguageMode::Cpp));
    assert_eq!(LanguageMode::parse("rust"), None);
}
