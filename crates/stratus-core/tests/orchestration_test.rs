//! End-to-end tests of the orchestration loop with a mock model.

mod common;

use common::{agent, big_listing, config, RecordingUiWriter, ScriptedExecutor, UiEvent};
use serde_json::{json, Value};
use stratus_config::LicenseTier;
use stratus_core::context_window::budget_for;
use stratus_core::prompts::DEFAULT_EXAMPLE_PROMPT;
use stratus_core::{
    ChatRequest, ChatStatus, CommandOutput, ContentPart, ConversationSession, MessageRole,
    PaginationContext, ResourceRecord, ToolExecutionError, LOAD_MORE_COMMAND,
    OPEN_RESOURCE_COMMAND, UPGRADE_COMMAND,
};
use stratus_providers::{LLMProvider, MockProvider, MockResponse};
use tokio_util::sync::CancellationToken;

fn tool_result_texts(messages: &[stratus_core::Message]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|part| match part {
            ContentPart::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_text_only_response_ends_after_one_round() {
    let provider = MockProvider::new()
        .with_response(MockResponse::streaming(vec!["Hello", " there"]));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("hi"), &mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.transcript, "Hello there");
    assert!(outcome.messages.iter().all(|m| !m.has_tool_calls()));
    assert_eq!(outcome.messages.last().unwrap().text(), "Hello there");
    assert_eq!(provider.request_count(), 1);
    assert!(executor.calls().is_empty());
    assert_eq!(ui.work_finished_count(), 1);

    // Text chunks reach the UI one by one, in order
    let markdown: Vec<UiEvent> = ui
        .events()
        .into_iter()
        .filter(|e| matches!(e, UiEvent::Markdown(_)))
        .collect();
    assert_eq!(
        markdown,
        vec![
            UiEvent::Markdown("Hello".to_string()),
            UiEvent::Markdown(" there".to_string())
        ]
    );
}

#[tokio::test]
async fn test_initial_messages_and_tools_sent() {
    let provider = MockProvider::new().with_response(MockResponse::text("ok"));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();
    session
        .resources
        .record(ResourceRecord::new("s3 bucket", "logs"));

    agent
        .chat(
            ChatRequest::new("what is in it?"),
            &mut session,
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    let request = &provider.get_requests()[0];
    assert_eq!(request.messages.len(), 3);
    assert!(request.messages[0].text().contains("Stratus"));
    assert_eq!(
        request.messages[1].text(),
        "Recent AWS resources: s3 bucket: logs"
    );
    assert_eq!(request.messages[2].text(), "what is in it?");
    let tool_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tool_names, vec!["s3", "logs", "lambda"]);
}

#[tokio::test]
async fn test_tool_round_trip() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::text_then_native_tool(
            "Let me check. ",
            "s3",
            json!({"command": "ListObjectsV2", "params": {"Bucket": "logs"}}),
        ),
        MockResponse::text("The bucket has 2 objects."),
    ]);
    let executor = ScriptedExecutor::new().on(
        "ListObjectsV2",
        Ok(CommandOutput::new(json!({"Contents": [{"Key": "a"}, {"Key": "b"}]}))
            .with_request_id("req-1")
            .with_http_status_code(200)),
    );
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("list logs bucket"), &mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(executor.calls().len(), 1);

    // assistant(tool calls) followed by one user tool_result per call
    let second_request = &provider.get_requests()[1];
    let n = second_request.messages.len();
    let assistant = &second_request.messages[n - 2];
    assert_eq!(assistant.role, MessageRole::Assistant);
    assert_eq!(assistant.text(), "Let me check. ");
    let call_id = assistant.tool_calls().next().unwrap().id.clone();

    let result = &second_request.messages[n - 1];
    assert_eq!(result.role, MessageRole::User);
    match &result.content[0] {
        ContentPart::ToolResult { call_id: id, content } => {
            assert_eq!(id, &call_id);
            let envelope: Value = serde_json::from_str(content).unwrap();
            assert_eq!(envelope["success"], true);
            assert_eq!(envelope["metadata"]["requestId"], "req-1");
            assert_eq!(envelope["metadata"]["httpStatusCode"], 200);
            assert_eq!(envelope["data"]["Contents"][1]["Key"], "b");
        }
        other => panic!("expected tool result, got {other:?}"),
    }

    let events = ui.events();
    assert!(events.contains(&UiEvent::Progress("Running s3 ListObjectsV2".to_string())));
    assert!(events.contains(&UiEvent::Reference(ResourceRecord::new("s3 bucket", "logs"))));
    assert_eq!(session.resources.get("s3 bucket").unwrap().name, "logs");
    assert_eq!(session.audit.len(), 1);

    let open = ui
        .buttons()
        .into_iter()
        .find(|b| b.command == OPEN_RESOURCE_COMMAND)
        .unwrap();
    assert_eq!(open.arguments[0], json!({"type": "s3 bucket", "name": "logs"}));
}

#[tokio::test]
async fn test_multiple_calls_run_sequentially_in_order() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_calls(vec![
            ("s3", json!({"command": "ListBuckets"})),
            ("logs", json!({"command": "DescribeLogGroups"})),
            ("lambda", json!({"command": "ListFunctions"})),
        ]),
        MockResponse::text("done"),
    ]);
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(
            ChatRequest::new("inventory"),
            &mut session,
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    let commands: Vec<String> = executor.calls().into_iter().map(|c| c.1).collect();
    assert_eq!(commands, vec!["ListBuckets", "DescribeLogGroups", "ListFunctions"]);
    let audited: Vec<&str> = session.audit.records().iter().map(|r| r.command.as_str()).collect();
    assert_eq!(audited, vec!["ListBuckets", "DescribeLogGroups", "ListFunctions"]);
    assert_eq!(tool_result_texts(&outcome.messages).len(), 3);
}

#[tokio::test]
async fn test_cancelled_confirmation_feeds_back_and_continues() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call(
            "s3",
            json!({"command": "DeleteObject", "params": {"Bucket": "logs", "Key": "a.txt", "Body": "payload"}}),
        ),
        MockResponse::text("Okay, I did not delete it."),
    ]);
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::with_answers(vec![Some(1)]);
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("delete a.txt"), &mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 2);
    assert!(executor.calls().is_empty());

    let prompts = ui.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("DeleteObject"));
    assert!(prompts[0].contains("\"[...]\""));
    assert!(!prompts[0].contains("payload"));

    let results = tool_result_texts(&outcome.messages);
    let envelope: Value = serde_json::from_str(&results[0]).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["name"], "CancelledByUser");

    assert_eq!(session.audit.len(), 1);
    assert!(!session.audit.records()[0].success);
}

#[tokio::test]
async fn test_unanswered_confirmation_is_cancel() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call("lambda", json!({"command": "Invoke", "params": {"FunctionName": "f"}})),
        MockResponse::text("ok"),
    ]);
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    agent
        .chat(ChatRequest::new("run f"), &mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(ui.prompts().len(), 1);
    assert!(executor.calls().is_empty());
    assert!(session.resources.is_empty());
}

#[tokio::test]
async fn test_pagination_truncation_and_load_more() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call(
            "s3",
            json!({"command": "ListObjectsV2", "params": {"Bucket": "reports"}}),
        ),
        MockResponse::text("Here are the first objects."),
        MockResponse::text("Here is the next page."),
    ]);
    let executor = ScriptedExecutor::new()
        .on(
            "ListObjectsV2",
            Ok(CommandOutput::new(json!({
                "items": big_listing(50),
                "NextContinuationToken": "abc"
            }))),
        )
        .on(
            "ListObjectsV2",
            Ok(CommandOutput::new(json!({"items": big_listing(3)}))),
        );
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("list reports"), &mut session, &ui, &CancellationToken::new())
        .await;

    let pagination = session.pagination.clone().unwrap();
    assert_eq!(pagination.token_type, "nextContinuationToken");
    assert_eq!(pagination.pagination_token, "abc");
    assert_eq!(pagination.command, "ListObjectsV2");
    assert_eq!(pagination.params, json!({"Bucket": "reports"}));

    let results = tool_result_texts(&outcome.messages);
    let (json_part, note) = results[0].rsplit_once('\n').unwrap();
    assert_eq!(note, "[Showing 10 of 50 items]");
    let envelope: Value = serde_json::from_str(json_part).unwrap();
    assert_eq!(envelope["data"]["items"].as_array().unwrap().len(), 10);
    assert_eq!(envelope["data"]["truncated"], true);
    assert_eq!(envelope["data"]["totalItems"], 50);

    let load_more = ui
        .buttons()
        .into_iter()
        .find(|b| b.command == LOAD_MORE_COMMAND)
        .unwrap();
    assert_eq!(load_more.arguments[0]["paginationToken"], "abc");

    // Follow the button
    let ui = RecordingUiWriter::new();
    let outcome = agent
        .load_more(&mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 1);
    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].2, json!({"Bucket": "reports", "ContinuationToken": "abc"}));
    assert!(session.pagination.is_none());
    assert!(ui.buttons().iter().all(|b| b.command != LOAD_MORE_COMMAND));
    assert_eq!(session.audit.len(), 2);

    let request = provider.get_requests().pop().unwrap();
    assert!(request.messages[request.messages.len() - 2].has_tool_calls());
}

#[tokio::test]
async fn test_load_more_without_context() {
    let provider = MockProvider::new();
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent.load_more(&mut session, &ui, &CancellationToken::new()).await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 0);
    assert!(outcome.transcript.contains("no more results"));
    assert_eq!(provider.request_count(), 0);
    assert_eq!(ui.work_finished_count(), 1);
}

fn stored_listing() -> PaginationContext {
    PaginationContext {
        tool_name: "s3".to_string(),
        command: "ListObjectsV2".to_string(),
        params: json!({"Bucket": "reports"}),
        pagination_token: "abc".to_string(),
        token_type: "nextContinuationToken".to_string(),
    }
}

#[tokio::test]
async fn test_load_more_keeps_continuation_when_stream_fails() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::failing("Here is ", "connection reset"),
        MockResponse::text("Here is the next page."),
    ]);
    let executor = ScriptedExecutor::new()
        .on("ListObjectsV2", Ok(CommandOutput::new(json!({"items": big_listing(3)}))))
        .on("ListObjectsV2", Ok(CommandOutput::new(json!({"items": big_listing(3)}))));
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();
    session.pagination = Some(stored_listing());

    let outcome = agent
        .load_more(&mut session, &RecordingUiWriter::new(), &CancellationToken::new())
        .await;
    assert_eq!(outcome.status, ChatStatus::Failed);
    assert_eq!(session.pagination, Some(stored_listing()));

    // The same page can be requested again
    let outcome = agent
        .load_more(&mut session, &RecordingUiWriter::new(), &CancellationToken::new())
        .await;
    assert_eq!(outcome.status, ChatStatus::Done);
    assert!(session.pagination.is_none());
    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].2, calls[1].2);
    assert_eq!(calls[1].2["ContinuationToken"], "abc");
}

#[tokio::test]
async fn test_load_more_keeps_continuation_when_cancelled() {
    let provider = MockProvider::new().with_response(MockResponse::text("never"));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();
    session.pagination = Some(stored_listing());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = agent
        .load_more(&mut session, &RecordingUiWriter::new(), &cancel)
        .await;

    assert_eq!(outcome.status, ChatStatus::Cancelled);
    assert!(executor.calls().is_empty());
    assert_eq!(session.pagination, Some(stored_listing()));
}

#[tokio::test]
async fn test_claude_family_budget() {
    let provider = MockProvider::new().with_family("claude-3-5-sonnet");
    assert_eq!(budget_for(provider.family()), 150_000);
}

#[tokio::test]
async fn test_history_pruned_to_small_budget() {
    // Unknown family: 6000 token budget. Each tool result is ~7.9k chars,
    // so the history outgrows the budget after a few rounds.
    let mut responses: Vec<MockResponse> = (0..8)
        .map(|_| MockResponse::native_tool_call("logs", json!({"command": "FilterLogEvents"})))
        .collect();
    responses.push(MockResponse::text("summary"));
    let provider = MockProvider::new().with_family("tiny").with_responses(responses);

    let mut executor = ScriptedExecutor::new();
    for _ in 0..8 {
        executor = executor.on(
            "FilterLogEvents",
            Ok(CommandOutput::new(json!({"events": "x".repeat(7800)}))),
        );
    }
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(
            ChatRequest::new("find errors"),
            &mut session,
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    let requests = provider.get_requests();
    assert_eq!(requests.len(), 9);
    for request in &requests {
        assert!(request.messages.len() <= 11);
        assert!(request.messages[0].text().contains("Stratus"));
    }
}

#[tokio::test]
async fn test_wide_round_over_budget_keeps_every_result() {
    // Ten ~3k char results overflow the 6000 token budget in one round, so
    // pruning drops the assistant message that issued the calls.
    let calls: Vec<(&str, Value)> = (0..10)
        .map(|_| ("logs", json!({"command": "FilterLogEvents"})))
        .collect();
    let provider = MockProvider::new().with_family("tiny").with_responses(vec![
        MockResponse::native_tool_calls(calls),
        MockResponse::text("summary"),
    ]);

    let mut executor = ScriptedExecutor::new();
    for i in 0..10 {
        executor = executor.on(
            "FilterLogEvents",
            Ok(CommandOutput::new(
                json!({"events": format!("stream-{i:02} {}", "e".repeat(3000))}),
            )),
        );
    }
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(
            ChatRequest::new("find errors in every stream"),
            &mut session,
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    let requests = provider.get_requests();
    assert_eq!(requests.len(), 2);

    let second = &requests[1].messages;
    assert!(second[0].text().contains("Stratus"));
    assert!(!second.iter().any(|m| m.has_tool_calls()));
    let results = tool_result_texts(second);
    assert_eq!(results.len(), 10);
    for i in 0..10 {
        let marker = format!("stream-{i:02}");
        assert!(
            results.iter().any(|r| r.contains(&marker)),
            "result for {marker} missing from the follow-up request"
        );
    }
}

#[tokio::test]
async fn test_cancelled_before_first_round() {
    let provider = MockProvider::new().with_response(MockResponse::text("never"));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let cancel = CancellationToken::new();
    cancel.cancel();
    cancel.cancel();

    let outcome = agent
        .chat(ChatRequest::new("hi"), &mut session, &ui, &cancel)
        .await;

    assert_eq!(outcome.status, ChatStatus::Cancelled);
    assert_eq!(outcome.rounds, 0);
    assert_eq!(provider.request_count(), 0);
    assert_eq!(ui.work_finished_count(), 1);
}

/// Cancels from inside a tool call, twice, to simulate repeated signals
struct CancellingExecutor {
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl stratus_core::CommandExecutor for CancellingExecutor {
    async fn execute(
        &self,
        _tool: &str,
        _command: &str,
        _params: &Value,
    ) -> Result<CommandOutput, ToolExecutionError> {
        self.cancel.cancel();
        tokio::task::yield_now().await;
        self.cancel.cancel();
        Ok(CommandOutput::new(json!({"Buckets": []})))
    }
}

#[tokio::test]
async fn test_cancellation_between_rounds_fires_end_of_work_once() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call("s3", json!({"command": "ListBuckets"})),
        MockResponse::text("unreachable"),
    ]);
    let cancel = CancellationToken::new();
    let mut registry = stratus_providers::ProviderRegistry::new();
    registry.register(provider.clone());
    let agent = stratus_core::Agent::new(
        config(),
        registry,
        &common::manifest(),
        std::sync::Arc::new(CancellingExecutor {
            cancel: cancel.clone(),
        }),
    );
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("buckets?"), &mut session, &ui, &cancel)
        .await;

    assert_eq!(outcome.status, ChatStatus::Cancelled);
    assert_eq!(outcome.rounds, 1);
    // The finished round stays: tool call and its result are kept
    assert_eq!(tool_result_texts(&outcome.messages).len(), 1);
    assert_eq!(provider.request_count(), 1);
    assert_eq!(ui.work_finished_count(), 1);
}

#[tokio::test]
async fn test_no_suitable_model() {
    let provider = MockProvider::new().with_vendor("openai").with_family("gpt-4o");
    let executor = ScriptedExecutor::new();
    let mut cfg = config();
    cfg.providers.default_model = "auto".to_string();
    let agent = agent(cfg, &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(
            ChatRequest::new("hi").with_family("anthropic", "claude"),
            &mut session,
            &ui,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::NoModel);
    assert_eq!(provider.request_count(), 0);
    assert!(outcome.transcript.contains("No suitable model"));
    assert_eq!(ui.work_finished_count(), 1);
}

#[tokio::test]
async fn test_auto_selects_matching_model() {
    let provider = MockProvider::new()
        .with_vendor("openai")
        .with_family("gpt-4o")
        .with_response(MockResponse::text("hi"));
    let executor = ScriptedExecutor::new();
    let mut cfg = config();
    cfg.providers.default_model = "auto".to_string();
    cfg.providers.vendor = "OpenAI".to_string();
    cfg.providers.family = "gpt-4".to_string();
    let agent = agent(cfg, &provider, &executor);

    let outcome = agent
        .chat(
            ChatRequest::new("hi"),
            &mut ConversationSession::new(),
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_stream_failure_renders_apology() {
    let provider = MockProvider::new()
        .with_response(MockResponse::failing("Partial ", "connection reset"));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("hi"), &mut session, &ui, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, ChatStatus::Failed);
    assert!(outcome.transcript.starts_with("Partial "));
    assert!(outcome.transcript.contains("connection reset"));
    assert!(outcome
        .transcript
        .contains("https://github.com/stratus-dev/stratus/issues/new"));
    assert_eq!(ui.work_finished_count(), 1);
}

#[tokio::test]
async fn test_tool_failure_is_fed_back_to_model() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call("s3", json!({"command": "GetObject", "params": {"Bucket": "b", "Key": "k"}})),
        MockResponse::text("That key does not exist."),
    ]);
    let executor = ScriptedExecutor::new().on(
        "GetObject",
        Err(ToolExecutionError::new("NoSuchKey", "The specified key does not exist.").with_status_code(404)),
    );
    let agent = agent(config(), &provider, &executor);
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(
            ChatRequest::new("read k"),
            &mut session,
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 2);
    let envelope: Value = serde_json::from_str(&tool_result_texts(&outcome.messages)[0]).unwrap();
    assert_eq!(envelope["error"]["name"], "NoSuchKey");
    assert_eq!(envelope["error"]["statusCode"], 404);
}

#[tokio::test]
async fn test_max_rounds_cap() {
    let provider = MockProvider::new().with_default_response(MockResponse::native_tool_call(
        "s3",
        json!({"command": "ListBuckets"}),
    ));
    let executor = ScriptedExecutor::new();
    let mut cfg = config();
    cfg.agent.max_rounds = Some(3);
    let agent = agent(cfg, &provider, &executor);

    let outcome = agent
        .chat(
            ChatRequest::new("loop forever"),
            &mut ConversationSession::new(),
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, ChatStatus::Done);
    assert_eq!(outcome.rounds, 3);
    assert_eq!(executor.calls().len(), 3);
    assert!(outcome.transcript.contains("Stopped after 3 rounds"));
}

#[tokio::test]
async fn test_upgrade_affordance_and_rejection_when_not_entitled() {
    let provider = MockProvider::new().with_responses(vec![
        MockResponse::native_tool_call("s3", json!({"command": "DeleteBucket", "params": {"Bucket": "b"}})),
        MockResponse::text("You need Pro for that."),
    ]);
    let executor = ScriptedExecutor::new();
    let mut cfg = config();
    cfg.license.tier = LicenseTier::Free;
    let agent = agent(cfg, &provider, &executor);
    let ui = RecordingUiWriter::new();
    let mut session = ConversationSession::new();

    let outcome = agent
        .chat(ChatRequest::new("delete b"), &mut session, &ui, &CancellationToken::new())
        .await;

    // No confirmation prompt, nothing executed
    assert!(ui.prompts().is_empty());
    assert!(executor.calls().is_empty());
    let envelope: Value = serde_json::from_str(&tool_result_texts(&outcome.messages)[0]).unwrap();
    assert_eq!(envelope["error"]["name"], "RequiresUpgrade");
    assert!(ui.buttons().iter().any(|b| b.command == UPGRADE_COMMAND));
}

#[tokio::test]
async fn test_goodwill_message() {
    let provider = MockProvider::new().with_default_response(MockResponse::text("You're welcome."));
    let executor = ScriptedExecutor::new();
    let agent = agent(config(), &provider, &executor);

    let outcome = agent
        .chat(
            ChatRequest::new("thanks!"),
            &mut ConversationSession::new(),
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;
    assert!(outcome.transcript.contains("Glad I could help"));

    let outcome = agent
        .chat(
            ChatRequest::new(DEFAULT_EXAMPLE_PROMPT),
            &mut ConversationSession::new(),
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;
    assert!(outcome.transcript.contains("Glad I could help"));

    let outcome = agent
        .chat(
            ChatRequest::new("list queues"),
            &mut ConversationSession::new(),
            &RecordingUiWriter::new(),
            &CancellationToken::new(),
        )
        .await;
    assert!(!outcome.transcript.contains("Glad I could help"));
}
