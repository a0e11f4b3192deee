// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

use sgpt::cache::{CacheWritePolicy, ResponseCache, TOOL_CALL_MARKER};
use sgpt::chat::{AgentConfig, ChatEngine};
use sgpt::error::{Result, SgptError};
use sgpt::llm::message::{MessageHistory, Role};
use sgpt::llm::mock_provider::MockTransport;
use sgpt::llm::provider::{FinishReason, StreamChunk, ToolDefinition};
use sgpt::tools::{
    InvocationMode, SchemaBuilder, ScriptedConfirmer, Tool, ToolContext, ToolInvoker, ToolOutput,
    ToolRegistry, ABORTED_NOTICE, DECLINED_MESSAGE,
};

/// Lists a directory, always answering with the same two files
#[derive(Default)]
struct ListDirectoryTool {
    calls: Mutex<Vec<Value>>,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_directory",
            "List the files in a directory",
            SchemaBuilder::new()
                .string("path", "Directory to list", true)
                .build(),
        )
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(input);
        Ok(ToolOutput::Structured(json!({
            "status": "success",
            "content": "a.txt\nb.txt",
        })))
    }
}

struct Harness {
    _dir: TempDir,
    transport: MockTransport,
    tool: Arc<ListDirectoryTool>,
    confirmer: Arc<ScriptedConfirmer>,
    cache: Arc<ResponseCache>,
    engine: ChatEngine,
}

fn harness(transport: MockTransport, answers: Vec<bool>, policy: CacheWritePolicy) -> Harness {
    let dir = TempDir::new().unwrap();
    let tool = Arc::new(ListDirectoryTool::default());
    let mut registry = ToolRegistry::new();
    registry.register(tool.clone());

    let confirmer = Arc::new(ScriptedConfirmer::new(answers));
    let invoker = ToolInvoker::new(
        Arc::new(registry),
        confirmer.clone(),
        ToolContext::new(dir.path().to_path_buf()),
    )
    .with_mode(InvocationMode::Confirmed);
    let cache = Arc::new(
        ResponseCache::new(dir.path().join("cache"), 10)
            .unwrap()
            .with_write_policy(policy),
    );
    let engine = ChatEngine::new(
        Arc::new(transport.clone()),
        cache.clone(),
        invoker,
        AgentConfig::default(),
    );

    Harness {
        _dir: dir,
        transport,
        tool,
        confirmer,
        cache,
        engine,
    }
}

async fn run_turn(engine: &ChatEngine, history: &mut MessageHistory, prompt: &str) -> Result<String> {
    let stream = engine.handle(history, prompt);
    let mut stream = std::pin::pin!(stream);
    let mut out = String::new();
    while let Some(fragment) = stream.next().await {
        out.push_str(&fragment?);
    }
    Ok(out)
}

fn list_tmp_then_answer() -> MockTransport {
    MockTransport::new()
        .with_tool_call("list_directory", &["{\"path\": ", "\"/tmp\"}"])
        .with_text_response(&["There are ", "two files."])
}

#[tokio::test]
async fn confirmed_tool_call_round_trip() {
    let h = harness(list_tmp_then_answer(), vec![true], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    let out = run_turn(&h.engine, &mut history, "what is in /tmp?").await.unwrap();

    assert!(out.contains(&format!(
        "> {} `list_directory(path=\"/tmp\")` \n\n",
        TOOL_CALL_MARKER
    )));
    assert!(out.contains("[Function list_directory executed]\n"));
    assert!(out.ends_with("There are two files."));

    // The fragments were concatenated before parsing
    assert_eq!(*h.tool.calls.lock().unwrap(), vec![json!({"path": "/tmp"})]);
    assert_eq!(h.confirmer.requests().len(), 1);

    let messages = history.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(
        messages[1].function_call.as_ref().unwrap().name,
        "list_directory"
    );
    assert_eq!(messages[2].role, Role::Function);
    assert_eq!(messages[2].name.as_deref(), Some("list_directory"));
    assert_eq!(messages[2].content, "a.txt\nb.txt");
    assert_eq!(messages[3].role, Role::Assistant);
    assert_eq!(messages[3].content, "There are two files.");

    // Second request carries the function result
    assert_eq!(h.transport.call_count(), 2);
    let second = h.transport.last_request().unwrap();
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[3].content, "a.txt\nb.txt");

    // First leg holds the marker, second leg ran with caching off
    assert!(h.cache.is_empty().unwrap());
}

#[tokio::test]
async fn always_policy_stores_the_continuation() {
    let h = harness(list_tmp_then_answer(), vec![true], CacheWritePolicy::Always);
    let mut history = MessageHistory::new();

    run_turn(&h.engine, &mut history, "what is in /tmp?").await.unwrap();

    let second = h.transport.last_request().unwrap();
    assert_eq!(h.cache.len().unwrap(), 1);
    assert_eq!(
        h.cache.get(&second.fingerprint().unwrap()).unwrap().as_deref(),
        Some("There are two files.")
    );
}

#[tokio::test]
async fn declined_call_ends_the_turn() {
    let h = harness(list_tmp_then_answer(), vec![false], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    let out = run_turn(&h.engine, &mut history, "what is in /tmp?").await.unwrap();

    assert!(out.ends_with(ABORTED_NOTICE));
    assert_eq!(h.transport.call_count(), 1);
    assert!(h.tool.calls.lock().unwrap().is_empty());

    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Function);
    assert_eq!(last.content, DECLINED_MESSAGE);
    assert_eq!(history.len(), 3);
    assert!(h.cache.is_empty().unwrap());
}

#[tokio::test]
async fn plain_answers_are_served_from_cache() {
    let transport = MockTransport::new().with_text_response(&["4"]);
    let h = harness(transport, vec![], CacheWritePolicy::WhenEnabled);

    let mut first = MessageHistory::new();
    assert_eq!(run_turn(&h.engine, &mut first, "2+2?").await.unwrap(), "4");

    let mut second = MessageHistory::new();
    assert_eq!(run_turn(&h.engine, &mut second, "2+2?").await.unwrap(), "4");

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(second.last().unwrap().content, "4");
}

#[tokio::test]
async fn first_fragment_arrives_before_the_response_completes() {
    let (transport, tx) = MockTransport::new().with_live_response();
    let h = harness(transport, vec![], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    tx.send(StreamChunk::text("first")).unwrap();

    let stream = h.engine.handle(&mut history, "stream please");
    let mut stream = std::pin::pin!(stream);

    let fragment = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("first fragment should not wait for the rest")
        .unwrap()
        .unwrap();
    assert_eq!(fragment, "first");

    tx.send(StreamChunk::text(" second")).unwrap();
    tx.send(StreamChunk::finish(FinishReason::Stop)).unwrap();
    drop(tx);

    let mut rest = String::new();
    while let Some(fragment) = stream.next().await {
        rest.push_str(&fragment.unwrap());
    }
    assert_eq!(rest, " second");
    assert_eq!(h.cache.len().unwrap(), 1);
}

#[tokio::test]
async fn interrupt_ends_the_turn_quietly() {
    let (transport, tx) = MockTransport::new().with_live_response();
    let h = harness(transport, vec![], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    tx.send(StreamChunk::text("partial")).unwrap();
    let flag = h.engine.interrupt_flag();

    let mut collected = Vec::new();
    {
        let stream = h.engine.handle(&mut history, "long answer");
        let mut stream = std::pin::pin!(stream);

        collected.push(stream.next().await.unwrap().unwrap());
        flag.store(true, Ordering::SeqCst);
        tx.send(StreamChunk::text(" more")).unwrap();

        while let Some(fragment) = stream.next().await {
            collected.push(fragment.unwrap());
        }
    }

    assert_eq!(collected, vec!["partial".to_string()]);
    assert!(h.cache.is_empty().unwrap());
    // Only the prompt was recorded
    assert_eq!(history.len(), 1);
    assert_eq!(history.last().unwrap().role, Role::User);
}

#[tokio::test]
async fn unknown_function_aborts_the_turn() {
    let transport = MockTransport::new().with_tool_call("delete_everything", &["{}"]);
    let h = harness(transport, vec![true], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    let err = run_turn(&h.engine, &mut history, "go").await.unwrap_err();

    assert!(matches!(err, SgptError::ToolNotFound(ref name) if name == "delete_everything"));
    assert_eq!(history.len(), 1);
    assert!(h.confirmer.requests().is_empty());
}

#[tokio::test]
async fn malformed_arguments_abort_before_execution() {
    let transport = MockTransport::new().with_tool_call("list_directory", &["{\"path\": "]);
    let h = harness(transport, vec![true], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    let err = run_turn(&h.engine, &mut history, "go").await.unwrap_err();

    assert!(matches!(err, SgptError::ToolArguments { .. }));
    assert!(h.tool.calls.lock().unwrap().is_empty());
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn transport_failure_is_fatal() {
    let transport = MockTransport::new().with_error("upstream exploded");
    let h = harness(transport, vec![], CacheWritePolicy::WhenEnabled);
    let mut history = MessageHistory::new();

    let err = run_turn(&h.engine, &mut history, "hi").await.unwrap_err();

    assert!(err.to_string().contains("upstream exploded"));
    assert!(h.cache.is_empty().unwrap());
}
