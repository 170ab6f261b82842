use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use codemate_common::{Envelope, Payload, ProtocolError, ToolResultPayload};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::*;
use crate::scheduler::{RateScheduler, SchedulerConfig};
use crate::{AiError, Backend, BackendResponse, Message, Role, TokenUsage, ToolCall, ToolDefinition};

/// Replays canned responses and records what it was asked.
#[derive(Default)]
struct ScriptedBackend {
    script: StdMutex<VecDeque<Result<BackendResponse, AiError>>>,
    seen_history: StdMutex<Vec<Vec<Message>>>,
    seen_tools: StdMutex<Vec<Vec<String>>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<BackendResponse, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: StdMutex::new(script.into()),
            ..Default::default()
        })
    }

    fn history(&self, call: usize) -> Vec<Message> {
        self.seen_history.lock().unwrap()[call].clone()
    }

    fn calls(&self) -> usize {
        self.seen_history.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        _system_prompt: &str,
    ) -> Result<BackendResponse, AiError> {
        self.seen_history.lock().unwrap().push(history.to_vec());
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::ApiError("script exhausted".into())))
    }
}

fn text(content: &str) -> Result<BackendResponse, AiError> {
    Ok(BackendResponse {
        text: content.into(),
        usage: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        },
        finish_reason: Some("STOP".into()),
        ..Default::default()
    })
}

fn tool_call(name: &str, arguments: Value) -> Result<BackendResponse, AiError> {
    Ok(BackendResponse {
        tool_calls: vec![ToolCall {
            id: "call-1".into(),
            name: name.into(),
            arguments,
        }],
        ..Default::default()
    })
}

fn open(backend: Arc<ScriptedBackend>) -> (Session, mpsc::UnboundedReceiver<Envelope>) {
    open_with(backend, SessionSettings::default())
}

fn open_with(
    backend: Arc<ScriptedBackend>,
    settings: SessionSettings,
) -> (Session, mpsc::UnboundedReceiver<Envelope>) {
    let (outbox, rx) = mpsc::unbounded_channel();
    let deps = SessionDeps {
        backend,
        scheduler: Arc::new(RateScheduler::new(SchedulerConfig::default())),
    };
    (Session::open(deps, settings, outbox), rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Payload {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for an envelope")
        .expect("outbox closed")
        .payload
}

async fn next_text(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> String {
    match next(rx).await {
        Payload::LlmResponse(p) => p.content,
        other => panic!("expected llm_response, got {other:?}"),
    }
}

async fn next_error(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> (String, Option<String>) {
    match next(rx).await {
        Payload::Error(p) => (p.message, p.code),
        other => panic!("expected error, got {other:?}"),
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn list_files_round_trip() {
    let backend = ScriptedBackend::new(vec![
        tool_call("glob", json!({ "pattern": "*" })),
        text("There is one file: a.txt"),
    ]);
    let (mut session, mut rx) = open(backend.clone());

    session.handle(Envelope::user_input("list files")).await.unwrap();

    let Payload::ToolCall(call) = next(&mut rx).await else {
        panic!("expected tool_call");
    };
    assert_eq!(call.name, "glob");
    assert_eq!(call.args, json!({ "pattern": "*" }));
    assert_eq!(session.pending_tools(), 1);
    assert_eq!(session.state(), SessionState::AwaitingTool);

    let result = ToolResultPayload::success(call.tool_id.clone(), json!({ "files": ["a.txt"] }));
    session.handle(Envelope::tool_result(result)).await.unwrap();

    assert_eq!(next_text(&mut rx).await, "There is one file: a.txt");
    settle().await;
    assert!(rx.try_recv().is_err(), "exactly one llm_response expected");
    assert_eq!(session.pending_tools(), 0);
    assert_eq!(session.state(), SessionState::Idle);

    let second = backend.history(1);
    assert_eq!(second[0], Message::user("list files"));
    assert_eq!(
        second.last().unwrap().content,
        r#"Tool executed successfully. Result: {"files":["a.txt"]}"#
    );
    assert_eq!(session.token_usage().output_tokens, 5);
}

#[tokio::test]
async fn executor_failure_is_fed_back_to_backend() {
    let backend = ScriptedBackend::new(vec![
        tool_call("read_file", json!({ "path": "missing.txt" })),
        text("That file does not exist."),
    ]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("read it")).await.unwrap();

    let Payload::ToolCall(call) = next(&mut rx).await else {
        panic!("expected tool_call");
    };
    session
        .handle(Envelope::tool_result(ToolResultPayload::failure(
            call.tool_id,
            "ENOENT",
        )))
        .await
        .unwrap();

    assert_eq!(next_text(&mut rx).await, "That file does not exist.");
    assert_eq!(
        backend.history(1).last().unwrap().content,
        "Tool execution failed: ENOENT"
    );
}

#[tokio::test]
async fn empty_backend_output_is_soft_failure() {
    let backend = ScriptedBackend::new(vec![Ok(BackendResponse::default())]);
    let (mut session, mut rx) = open(backend);
    session.handle(Envelope::user_input("hello")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "empty response, please retry");
}

#[tokio::test]
async fn step_limit_returns_last_text() {
    let mut settings = SessionSettings::default();
    settings.max_steps = 2;
    let mut with_text = tool_call("get_plan", json!({})).unwrap();
    with_text.text = "Checking the plan.".into();
    let backend = ScriptedBackend::new(vec![
        Ok(with_text),
        tool_call("get_plan", json!({})),
        text("never reached"),
    ]);
    let (mut session, mut rx) = open_with(backend.clone(), settings);
    session.handle(Envelope::user_input("loop")).await.unwrap();

    assert_eq!(next_text(&mut rx).await, "Checking the plan.");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn backend_error_becomes_error_envelope() {
    let backend = ScriptedBackend::new(vec![Err(AiError::ApiError("bad request".into()))]);
    let (mut session, mut rx) = open(backend);
    session.handle(Envelope::user_input("hi")).await.unwrap();

    let (message, code) = next_error(&mut rx).await;
    assert_eq!(message, "API error: bad request");
    assert_eq!(code.as_deref(), Some("backend_error"));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_call_is_retried_with_notice() {
    let backend = ScriptedBackend::new(vec![
        Err(AiError::RateLimited("quota exceeded".into())),
        text("done"),
    ]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("hi")).await.unwrap();

    assert_eq!(
        next_text(&mut rx).await,
        "⏳ Rate limit exceeded. Retrying in 10 seconds... (attempt 1/3)"
    );
    assert_eq!(next_text(&mut rx).await, "done");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn inputs_are_answered_in_order() {
    let backend = ScriptedBackend::new(vec![text("first"), text("second")]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("one")).await.unwrap();
    session.handle(Envelope::user_input("two")).await.unwrap();

    assert_eq!(next_text(&mut rx).await, "first");
    assert_eq!(next_text(&mut rx).await, "second");

    let contents: Vec<String> = backend.history(1).into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["one", "first", "two"]);
    assert_eq!(backend.history(1)[1].role, Role::Assistant);
}

#[tokio::test]
async fn clear_command_resets_history() {
    let backend = ScriptedBackend::new(vec![text("hi there"), text("fresh start")]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("hello")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "hi there");

    session
        .handle(Envelope::command(codemate_common::Command::Clear))
        .await
        .unwrap();
    assert!(matches!(next(&mut rx).await, Payload::Command(c) if c.command == "clear"));
    assert_eq!(next_text(&mut rx).await, "✅ Conversation cleared");

    session.handle(Envelope::user_input("again")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "fresh start");
    assert_eq!(backend.history(1), vec![Message::user("again")]);
}

#[tokio::test]
async fn compact_command_summarizes_history() {
    let backend = ScriptedBackend::new(vec![
        text("hi there"),
        text("The user greeted the assistant."),
        text("ok"),
    ]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("hello")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "hi there");

    session
        .handle(Envelope::command(codemate_common::Command::Compact))
        .await
        .unwrap();
    assert!(matches!(next(&mut rx).await, Payload::Command(c) if c.command == "compact"));
    assert_eq!(next_text(&mut rx).await, "✅ Conversation compacted");

    session.handle(Envelope::user_input("next")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "ok");
    let history = backend.history(2);
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].content,
        "[Previous conversation summary]: The user greeted the assistant."
    );
}

#[tokio::test]
async fn compact_with_empty_history_is_noop() {
    let backend = ScriptedBackend::new(vec![]);
    let (mut session, mut rx) = open(backend.clone());
    session
        .handle(Envelope::command(codemate_common::Command::Compact))
        .await
        .unwrap();
    assert_eq!(next_text(&mut rx).await, "Nothing to compact");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn compact_failure_is_reported() {
    let backend = ScriptedBackend::new(vec![text("hi"), Err(AiError::ApiError("boom".into()))]);
    let (mut session, mut rx) = open(backend);
    session.handle(Envelope::user_input("hello")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "hi");

    session
        .handle(Envelope::command(codemate_common::Command::Compact))
        .await
        .unwrap();
    let (message, code) = next_error(&mut rx).await;
    assert_eq!(message, "Failed to compact conversation: API error: boom");
    assert_eq!(code.as_deref(), Some("compact_failed"));
}

#[tokio::test]
async fn unknown_command_is_an_error() {
    let (mut session, mut rx) = open(ScriptedBackend::new(vec![]));
    let envelope = Envelope::new(Payload::Command(codemate_common::CommandPayload {
        command: "teleport".into(),
    }));
    session.handle(envelope).await.unwrap();

    let (message, code) = next_error(&mut rx).await;
    assert_eq!(message, "Unknown command: /teleport");
    assert_eq!(code.as_deref(), Some("unknown_command"));
}

#[tokio::test]
async fn unmatched_tool_result_is_rejected() {
    let (mut session, _rx) = open(ScriptedBackend::new(vec![]));
    let err = session
        .handle(Envelope::tool_result(ToolResultPayload::success("ghost", json!(1))))
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::UnexpectedToolResult("ghost".into()));
    assert_eq!(err.code(), "unexpected_tool_result");
}

#[tokio::test]
async fn server_only_types_are_rejected() {
    let (mut session, _rx) = open(ScriptedBackend::new(vec![]));
    let err = session
        .handle(Envelope::llm_response("spoofed"))
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::UnexpectedType("llm_response".into()));
}

#[tokio::test]
async fn empty_tool_result_fails_the_call_and_reports() {
    let backend = ScriptedBackend::new(vec![
        tool_call("bash", json!({ "command": "ls" })),
        text("The command produced nothing usable."),
    ]);
    let (mut session, mut rx) = open(backend.clone());
    session.handle(Envelope::user_input("run ls")).await.unwrap();

    let Payload::ToolCall(call) = next(&mut rx).await else {
        panic!("expected tool_call");
    };
    let empty = ToolResultPayload {
        tool_id: call.tool_id,
        result: None,
        error: None,
    };
    let err = session.handle(Envelope::tool_result(empty)).await.unwrap_err();
    assert_eq!(err.code(), "invalid_payload");

    assert_eq!(next_text(&mut rx).await, "The command produced nothing usable.");
    assert!(backend
        .history(1)
        .last()
        .unwrap()
        .content
        .starts_with("Tool execution failed: Invalid tool result"));
}

#[tokio::test]
async fn registered_tools_are_offered_to_backend() {
    let backend = ScriptedBackend::new(vec![text("ok")]);
    let (mut session, mut rx) = open(backend.clone());
    let registration = Envelope::new(Payload::ToolRegistration(
        codemate_common::ToolRegistrationPayload {
            tools: vec![ToolDefinition {
                name: "mcp_docs".into(),
                description: "Search docs.".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            }],
        },
    ));
    session.handle(registration).await.unwrap();
    session.handle(Envelope::user_input("hi")).await.unwrap();
    assert_eq!(next_text(&mut rx).await, "ok");

    let offered = backend.seen_tools.lock().unwrap()[0].clone();
    assert!(offered.contains(&"mcp_docs".to_string()));
    assert!(offered.contains(&"glob".to_string()));
}

#[tokio::test]
async fn close_cancels_pending_tool_calls() {
    let backend = ScriptedBackend::new(vec![tool_call("bash", json!({ "command": "sleep 60" }))]);
    let (mut session, mut rx) = open(backend);
    session.handle(Envelope::user_input("wait")).await.unwrap();
    assert!(matches!(next(&mut rx).await, Payload::ToolCall(_)));
    assert_eq!(session.pending_tools(), 1);

    session.close().await;
    settle().await;
    // The aborted worker sends nothing more.
    assert!(!matches!(rx.try_recv(), Ok(Envelope { payload: Payload::LlmResponse(_), .. })));
}

#[tokio::test]
async fn plan_snapshots_reach_the_client() {
    let backend = ScriptedBackend::new(vec![
        tool_call("create_plan", json!({ "tasks": ["inspect", "fix"], "description": "bugfix" })),
        text("Plan created."),
    ]);
    let (mut session, mut rx) = open(backend);
    session.handle(Envelope::user_input("make a plan")).await.unwrap();

    let Payload::PlanData(data) = next(&mut rx).await else {
        panic!("expected plan_data");
    };
    assert_eq!(data.session_id, session.id().as_str());
    assert_eq!(data.plan.tasks.len(), 2);
    assert_eq!(data.plan.description.as_deref(), Some("bugfix"));
    assert_eq!(next_text(&mut rx).await, "Plan created.");
}
