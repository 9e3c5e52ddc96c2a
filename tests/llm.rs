#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use threadscope::{extract_content, is_affirmative, parse_json_reply, LlmError, LlmGateway, StructuredReply};

/// "yes" anywhere, in any case, is affirmative.
#[test]
fn affirmative_replies() {
    assert!(is_affirmative("Yes."));
    assert!(is_affirmative("I would say YES, relevant"));
    assert!(!is_affirmative("No"));
    assert!(!is_affirmative(""));
}

/// The assistant text is read from the first choice.
#[test]
fn extracts_choice_content() {
    let body = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
    assert_eq!(extract_content(&body).unwrap(), "hello");

    let empty = json!({"choices": [{"message": {"content": "  "}}]});
    assert!(matches!(extract_content(&empty), Err(LlmError::EmptyResponse)));

    let null = json!({"choices": [{"message": {"content": null}}]});
    assert!(matches!(extract_content(&null), Err(LlmError::EmptyResponse)));

    let odd = json!({"error": "nope"});
    assert!(matches!(extract_content(&odd), Err(LlmError::Parse(_))));
}

/// JSON replies parse with or without a code fence.
#[test]
fn parses_json_replies() {
    assert_eq!(parse_json_reply("{\"a\": 1}"), Some(json!({"a": 1})));
    assert_eq!(parse_json_reply("```json\n[1, 2]\n```"), Some(json!([1, 2])));
    assert_eq!(parse_json_reply("not json"), None);
}

/// Structured calls use JSON mode and report unparsable or failed replies
/// without erroring.
#[test]
fn structured_reply_outcomes() {
    let llm = ScriptedLlm::new(|msgs, _, _| match user_text(msgs) {
        "good" => Ok("{\"ok\": true}".into()),
        "bad" => Ok("sure thing".into()),
        _ => Err(LlmError::RateLimited),
    });
    assert_eq!(llm.analyze_structured("s", "good", "m"), StructuredReply::Json(json!({"ok": true})));
    match llm.analyze_structured("s", "bad", "m") {
        StructuredReply::Unparsed { raw, .. } => assert_eq!(raw.as_deref(), Some("sure thing")),
        other => panic!("unexpected {other:?}"),
    }
    match llm.analyze_structured("s", "down", "m") {
        StructuredReply::Unparsed { raw, .. } => assert!(raw.is_none()),
        other => panic!("unexpected {other:?}"),
    }
    let calls = llm.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.json_mode && c.model == "m" && c.system == "s"));

    llm.classify("s", "good", "m").unwrap();
    assert!(!llm.calls().last().unwrap().json_mode);
}
