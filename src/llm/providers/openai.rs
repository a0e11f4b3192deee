// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions transport
//!
//! Speaks the `/chat/completions` streaming protocol (server-sent events
//! with `data: {json}` lines and a `[DONE]` terminator) used by OpenAI and
//! most compatible gateways, and normalizes each event into a
//! [`StreamChunk`].

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result, SgptError};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionTransport, FinishReason, StreamChunk,
    ToolCallFragment, ToolChoice,
};

/// Default API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible streaming transport
pub struct OpenAiTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    /// Create a transport for the public OpenAI API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_BASE)
    }

    /// Create with a custom base URL (e.g. a local gateway)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert history messages to the wire format.
    ///
    /// Calls that carry a provider id use the `tool_calls`/`tool` shape;
    /// calls without one fall back to the legacy `function_call`/`function`
    /// shape.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|msg| match (msg.role, &msg.function_call) {
                (Role::Assistant, Some(call)) => match &call.id {
                    Some(id) => OpenAiMessage {
                        role: "assistant".to_string(),
                        tool_calls: Some(vec![OpenAiToolCall {
                            id: id.clone(),
                            r#type: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        }]),
                        ..Default::default()
                    },
                    None => OpenAiMessage {
                        role: "assistant".to_string(),
                        function_call: Some(OpenAiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        }),
                        ..Default::default()
                    },
                },
                (Role::Function, _) => match &msg.tool_call_id {
                    Some(id) => OpenAiMessage {
                        role: "tool".to_string(),
                        content: Some(msg.content.clone()),
                        tool_call_id: Some(id.clone()),
                        ..Default::default()
                    },
                    None => OpenAiMessage {
                        role: "function".to_string(),
                        content: Some(msg.content.clone()),
                        name: msg.name.clone(),
                        ..Default::default()
                    },
                },
                (role, _) => OpenAiMessage {
                    role: match role {
                        Role::System => "system",
                        Role::User => "user",
                        _ => "assistant",
                    }
                    .to_string(),
                    content: Some(msg.content.clone()),
                    ..Default::default()
                },
            })
            .collect()
    }

    fn convert_tool_choice(choice: &ToolChoice) -> Value {
        match choice {
            ToolChoice::Auto => Value::from("auto"),
            ToolChoice::None => Value::from("none"),
            ToolChoice::Required => Value::from("required"),
            ToolChoice::Specific(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            }),
        }
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let has_tools = !request.tools.is_empty();
        OpenAiRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            top_p: request.top_p,
            tools: has_tools.then(|| {
                request
                    .tools
                    .iter()
                    .map(|t| t.to_function_schema())
                    .collect()
            }),
            tool_choice: has_tools.then(|| Self::convert_tool_choice(&request.tool_choice)),
            parallel_tool_calls: has_tools.then_some(request.parallel_tool_calls),
            stream: true,
        }
    }

    /// Parse an error response
    fn parse_error(status: u16, body: &str) -> SgptError {
        let (message, code) = match serde_json::from_str::<OpenAiError>(body) {
            Ok(error) => (error.error.message, error.error.code.unwrap_or_default()),
            Err(_) => (body.to_string(), String::new()),
        };

        let api_error = match (status, code.as_str()) {
            (401, _) | (_, "invalid_api_key") => ApiError::AuthenticationFailed,
            (429, _) | (_, "rate_limit_exceeded") => ApiError::RateLimited(60),
            (_, "model_not_found") => ApiError::ModelNotFound(message),
            (404, _) if message.contains("model") => ApiError::ModelNotFound(message),
            _ => ApiError::ServerError { status, message },
        };
        SgptError::Api(api_error)
    }
}

fn map_transport_error(err: reqwest::Error) -> SgptError {
    if err.is_timeout() {
        SgptError::Api(ApiError::Timeout)
    } else if err.is_connect() {
        SgptError::Api(ApiError::Network(err.to_string()))
    } else {
        SgptError::Http(err)
    }
}

/// Parse one SSE line. `Ok(None)` means nothing to forward.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    if let Ok(chunk) = serde_json::from_str::<OpenAiStreamChunk>(data) {
        return Ok(chunk.into_chunk().map(SseEvent::Chunk));
    }
    if let Ok(error) = serde_json::from_str::<OpenAiError>(data) {
        return Err(SgptError::Api(ApiError::StreamError(error.error.message)));
    }
    tracing::warn!(target: "sgpt.llm.openai", data, "ignoring unparseable stream event");
    Ok(None)
}

#[derive(Debug)]
enum SseEvent {
    Chunk(StreamChunk),
    Done,
}

/// Split the next complete line off a byte buffer.
///
/// Lines are decoded only once whole, so a character split across network
/// reads is reassembled before conversion.
fn take_line(buffer: &mut Vec<u8>) -> Result<Option<String>> {
    let Some(line_end) = buffer.iter().position(|b| *b == b'\n') else {
        return Ok(None);
    };
    let line: Vec<u8> = buffer.drain(..=line_end).collect();
    decode_line(line).map(Some)
}

fn decode_line(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line).map_err(|e| {
        SgptError::Api(ApiError::StreamError(format!(
            "stream line is not valid UTF-8: {}",
            e.utf8_error()
        )))
    })
}

/// Turn a stream of raw response bytes into normalized chunks
fn sse_chunks<S, B>(bytes: S) -> impl futures::Stream<Item = Result<StreamChunk>> + Send
where
    S: futures::Stream<Item = Result<B>> + Send,
    B: AsRef<[u8]> + Send,
{
    async_stream::try_stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while !done {
            match bytes.next().await {
                Some(next) => {
                    buffer.extend_from_slice(next?.as_ref());

                    while let Some(line) = take_line(&mut buffer)? {
                        match parse_sse_line(&line)? {
                            Some(SseEvent::Chunk(chunk)) => yield chunk,
                            Some(SseEvent::Done) => {
                                done = true;
                                break;
                            }
                            None => {}
                        }
                    }
                }
                None => {
                    // Trailing event without a final newline
                    let rest = decode_line(std::mem::take(&mut buffer))?;
                    if let Some(SseEvent::Chunk(chunk)) = parse_sse_line(&rest)? {
                        yield chunk;
                    }
                    done = true;
                }
            }
        }
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let body = self.build_request(&request);
        tracing::debug!(
            target: "sgpt.llm.openai",
            model = %body.model,
            messages = body.messages.len(),
            timeout_secs = request.timeout.as_secs(),
            "sending request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let bytes = response
            .bytes_stream()
            .map(|next| next.map_err(map_transport_error));
        let chunk_stream = sse_chunks(bytes);

        Ok(Box::pin(chunk_stream))
    }
}

// OpenAI API wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    stream: bool,
}

#[derive(Debug, Default, Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<OpenAiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
    function_call: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

impl OpenAiStreamChunk {
    /// First choice as a normalized chunk; usage-only events have none
    fn into_chunk(self) -> Option<StreamChunk> {
        let choice = self.choices.into_iter().next()?;
        let delta = choice.delta;

        let mut tool_calls: Vec<ToolCallFragment> = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallFragment {
                    index: tc.index.unwrap_or(0),
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();

        if let Some(f) = delta.function_call {
            tool_calls.push(ToolCallFragment {
                index: 0,
                id: None,
                name: f.name,
                arguments: f.arguments,
            });
        }

        Some(StreamChunk {
            content: delta.content,
            tool_calls,
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::FunctionCall;
    use crate::llm::provider::{ToolDefinition, ToolInputSchema};

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "execute_shell_command".to_string(),
            description: "Run a command".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: serde_json::json!({"command": {"type": "string"}}),
                required: vec!["command".to_string()],
            },
        }
    }

    #[test]
    fn test_transport_base_url() {
        let transport = OpenAiTransport::with_base_url("key", "http://localhost:8080/v1/");
        assert_eq!(transport.base_url(), "http://localhost:8080/v1");
        assert_eq!(
            transport.endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(OpenAiTransport::new("key").base_url(), OPENAI_API_BASE);
    }

    #[test]
    fn test_convert_simple_messages() {
        let converted = OpenAiTransport::convert_messages(&[
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        let roles: Vec<&str> = converted.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(converted[1].content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_convert_modern_function_messages() {
        let converted = OpenAiTransport::convert_messages(&[
            Message::function_call(FunctionCall {
                id: Some("call_1".to_string()),
                name: "ls".to_string(),
                arguments: "{}".to_string(),
            }),
            Message::function_result("ls", "a.txt", Some("call_1".to_string())),
        ]);

        let json = serde_json::to_value(&converted).unwrap();
        assert_eq!(json[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(json[0]["tool_calls"][0]["function"]["name"], "ls");
        assert!(json[0].get("content").is_none());
        assert_eq!(json[1]["role"], "tool");
        assert_eq!(json[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_convert_legacy_function_messages() {
        let converted = OpenAiTransport::convert_messages(&[
            Message::function_call(FunctionCall {
                id: None,
                name: "ls".to_string(),
                arguments: "{}".to_string(),
            }),
            Message::function_result("ls", "a.txt", None),
        ]);

        let json = serde_json::to_value(&converted).unwrap();
        assert_eq!(json[0]["function_call"]["name"], "ls");
        assert_eq!(json[1]["role"], "function");
        assert_eq!(json[1]["name"], "ls");
    }

    #[test]
    fn test_build_request_with_tools() {
        let transport = OpenAiTransport::new("key");
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")])
            .with_tools(vec![tool()]);
        let json = serde_json::to_value(transport.build_request(&request)).unwrap();

        assert_eq!(json["stream"], true);
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["parallel_tool_calls"], false);
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "execute_shell_command");
    }

    #[test]
    fn test_build_request_without_tools_omits_tool_fields() {
        let transport = OpenAiTransport::new("key");
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")]);
        let json = serde_json::to_value(transport.build_request(&request)).unwrap();

        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("parallel_tool_calls").is_none());
    }

    #[test]
    fn test_tool_choice_specific() {
        let value = OpenAiTransport::convert_tool_choice(&ToolChoice::Specific("ls".to_string()));
        assert_eq!(value["function"]["name"], "ls");
    }

    #[test]
    fn test_parse_error_authentication() {
        let err = OpenAiTransport::parse_error(
            401,
            r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#,
        );
        assert!(matches!(err, SgptError::Api(ApiError::AuthenticationFailed)));
    }

    #[test]
    fn test_parse_error_rate_limit() {
        let err = OpenAiTransport::parse_error(429, "slow down");
        assert!(matches!(err, SgptError::Api(ApiError::RateLimited(_))));
    }

    #[test]
    fn test_parse_error_model_not_found() {
        let err = OpenAiTransport::parse_error(
            404,
            r#"{"error":{"message":"The model `gpt-9` does not exist","code":"model_not_found"}}"#,
        );
        assert!(matches!(err, SgptError::Api(ApiError::ModelNotFound(_))));
    }

    #[test]
    fn test_parse_error_plain_body() {
        let err = OpenAiTransport::parse_error(502, "bad gateway");
        match err {
            SgptError::Api(ApiError::ServerError { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sse_text_line() {
        let event = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#)
            .unwrap();
        match event {
            Some(SseEvent::Chunk(chunk)) => assert_eq!(chunk.content.as_deref(), Some("Hi")),
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn test_parse_sse_tool_call_line() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"ls","arguments":"{\"pa"}}]},"finish_reason":null}]}"#;
        match parse_sse_line(line).unwrap() {
            Some(SseEvent::Chunk(chunk)) => {
                let fragment = &chunk.tool_calls[0];
                assert_eq!(fragment.id.as_deref(), Some("call_1"));
                assert_eq!(fragment.name.as_deref(), Some("ls"));
                assert_eq!(fragment.arguments.as_deref(), Some("{\"pa"));
            }
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn test_parse_sse_legacy_function_call_line() {
        let line = r#"data: {"choices":[{"delta":{"function_call":{"name":"ls","arguments":""}},"finish_reason":null}]}"#;
        match parse_sse_line(line).unwrap() {
            Some(SseEvent::Chunk(chunk)) => {
                assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("ls"))
            }
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn test_parse_sse_done_comment_and_usage() {
        assert!(matches!(parse_sse_line("data: [DONE]").unwrap(), Some(SseEvent::Done)));
        assert!(parse_sse_line(": keep-alive").unwrap().is_none());
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(r#"data: {"choices":[],"usage":{"total_tokens":3}}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_sse_error_event() {
        let err = parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(matches!(err, SgptError::Api(ApiError::StreamError(_))));
    }

    async fn collect_chunks(parts: Vec<Vec<u8>>) -> Result<Vec<StreamChunk>> {
        let bytes = futures::stream::iter(parts.into_iter().map(Ok::<_, SgptError>));
        let stream = sse_chunks(bytes);
        let mut stream = std::pin::pin!(stream);
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }

    #[tokio::test]
    async fn test_sse_chunks_reassemble_split_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
        let raw = line.as_bytes();
        // Split between the two bytes of the accented character
        let split = raw.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let chunks = collect_chunks(vec![raw[..split].to_vec(), raw[split..].to_vec()])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content.as_deref(), Some("caf\u{e9}"));
    }

    #[tokio::test]
    async fn test_sse_chunks_trailing_line_without_newline() {
        let raw = br#"data: {"choices":[{"delta":{"content":"end"},"finish_reason":"stop"}]}"#;
        let chunks = collect_chunks(vec![raw.to_vec()]).await.unwrap();
        assert_eq!(chunks[0].content.as_deref(), Some("end"));
    }

    #[tokio::test]
    async fn test_sse_chunks_reject_invalid_utf8() {
        let parts = vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"\xff\"}}]}\n".to_vec()];
        let err = collect_chunks(parts).await.unwrap_err();
        assert!(matches!(err, SgptError::Api(ApiError::StreamError(_))));
    }

    #[tokio::test]
    async fn test_sse_chunks_stop_at_done() {
        let raw = b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n";
        let chunks = collect_chunks(vec![raw.to_vec()]).await.unwrap();
        assert!(chunks.is_empty());
    }
}
