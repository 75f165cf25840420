use std::sync::Arc;

use anyhow::Result;
use integration_tests::support::{
    answer, conversation, flight_record, last_function_result, provider_down, tool_call,
    RecordingStore, ScriptedModel, FALLBACK,
};
use orchestrator::prompt::{seed_conversation, system_instruction};
use orchestrator::{ConversationMessage, FunctionRegistry, Termination, UserIdentity};
use serde_json::Value;

fn seed(question: &str) -> Vec<ConversationMessage> {
    let instruction = system_instruction(&FunctionRegistry::new(), Some("/flight-records/:id"));
    let user = UserIdentity {
        username: "mtech".to_string(),
        display_name: Some("Maria Tech".to_string()),
    };
    seed_conversation(&instruction, &user, vec![ConversationMessage::user(question)])
}

fn store() -> Arc<RecordingStore> {
    Arc::new(RecordingStore::new(
        (1..=25)
            .map(|day| flight_record(&format!("FR-{day:03}"), day))
            .chain(std::iter::once(flight_record("ABC123", 28)))
            .collect(),
    ))
}

#[tokio::test]
async fn resolves_a_record_in_one_round() -> Result<()> {
    let model = ScriptedModel::new(vec![
        Ok(tool_call("call_1", "get_flight_record_by_id", r#"{"id":"ABC123"}"#)),
        answer("ABC123 flew SYD to MEL on VH-OQA."),
    ]);
    let chat = conversation(model.clone(), store(), 3);

    let outcome = chat.run(seed("show me flight ABC123")).await;

    assert_eq!(outcome.termination, Termination::Answered);
    assert_eq!(outcome.dispatch_rounds, 1);
    assert_eq!(outcome.answer, "ABC123 flew SYD to MEL on VH-OQA.");
    let payload = last_function_result(&model.requests.lock()[1]).expect("function result");
    assert_eq!(payload["aircraftRegistration"], "VH-OQA");
    assert_eq!(payload["attachments"][0]["fileSize"], "9007199254740993");
    assert!(payload["attachments"][0].get("storageKey").is_none());
    assert!(payload.get("technician").is_none());
    Ok(())
}

#[tokio::test]
async fn missing_record_is_reported_as_null() -> Result<()> {
    let model = ScriptedModel::new(vec![
        Ok(tool_call("call_1", "get_flight_record_by_id", r#"{"id":"NOPE99"}"#)),
        answer("I could not find flight NOPE99."),
    ]);
    let chat = conversation(model.clone(), store(), 3);

    let outcome = chat.run(seed("show me flight NOPE99")).await;

    assert_eq!(outcome.termination, Termination::Answered);
    assert!(!outcome.dispatches[0].is_error);
    assert_eq!(
        last_function_result(&model.requests.lock()[1]),
        Some(Value::Null)
    );
    Ok(())
}

#[tokio::test]
async fn oversized_limit_is_clamped_before_the_store_runs() -> Result<()> {
    let store = store();
    let model = ScriptedModel::new(vec![
        Ok(tool_call("call_1", "list_recent_flight_records", r#"{"limit":500}"#)),
        answer("Here are the latest flights."),
    ]);
    let chat = conversation(model.clone(), store.clone(), 3);

    chat.run(seed("what flew recently?")).await;

    assert_eq!(*store.recent_limits.lock(), vec![20]);
    let payload = last_function_result(&model.requests.lock()[1]).expect("function result");
    let records = payload.as_array().expect("array payload");
    assert_eq!(records.len(), 20);
    assert_eq!(records[0]["id"], "ABC123");
    assert!(records[0].get("attachments").is_none());
    Ok(())
}

#[tokio::test]
async fn undeclared_function_is_an_error_result_and_the_loop_continues() -> Result<()> {
    let model = ScriptedModel::new(vec![
        Ok(tool_call("call_1", "delete_flight_record", r#"{"id":"ABC123"}"#)),
        answer("I can only read flight records."),
    ]);
    let chat = conversation(model.clone(), store(), 3);

    let outcome = chat.run(seed("delete ABC123")).await;

    assert_eq!(outcome.termination, Termination::Answered);
    assert_eq!(outcome.answer, "I can only read flight records.");
    assert!(outcome.dispatches[0].is_error);
    let payload = last_function_result(&model.requests.lock()[1]).expect("function result");
    assert_eq!(payload["error"], "unknown_function");
    Ok(())
}

#[tokio::test]
async fn endless_tool_requests_end_with_the_fallback() -> Result<()> {
    let model = ScriptedModel::new(Vec::new());
    let chat = conversation(model.clone(), store(), 3);

    let outcome = chat.run(seed("keep digging")).await;

    assert_eq!(outcome.termination, Termination::BudgetExhausted);
    assert_eq!(outcome.answer, FALLBACK);
    assert_eq!(outcome.dispatch_rounds, 3);
    assert_eq!(model.calls(), 4);
    Ok(())
}

#[tokio::test]
async fn provider_failure_mid_conversation_ends_with_the_fallback() -> Result<()> {
    let model = ScriptedModel::new(vec![
        Ok(tool_call("call_1", "search_flight_records", r#"{"hasDefect":true}"#)),
        provider_down(),
    ]);
    let chat = conversation(model, store(), 3);

    let outcome = chat.run(seed("any defects?")).await;

    assert_eq!(outcome.termination, Termination::ModelFailed);
    assert_eq!(outcome.answer, FALLBACK);
    assert_eq!(outcome.dispatch_rounds, 1);
    Ok(())
}
