// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion transport trait and related types
//!
//! Defines the abstraction layer between the chat engine and a streaming
//! chat-completion backend. Backends normalize their wire chunks into
//! [`StreamChunk`] so nothing above this layer sees provider shapes.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::cache::{self, Fingerprint};
use crate::error::Result;
use crate::llm::message::Message;

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Stream of normalized chunks produced by a transport
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Main trait for completion backends
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Get the transport name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Open a streaming completion
    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream>;
}

/// Request for a streaming completion
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling
    pub top_p: f32,

    /// Messages in the conversation, system prompt first
    pub messages: Vec<Message>,

    /// Tools available for the model to use
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// How to handle tool choice
    pub tool_choice: ToolChoice,

    /// Always false: one function call per response
    pub parallel_tool_calls: bool,

    /// Transport timeout, not part of the request identity
    #[serde(skip)]
    pub timeout: Duration,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            top_p: 1.0,
            messages,
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set top_p
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set tool choice
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cache key for this request
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        cache::fingerprint(self)
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of message
    Stop,
    /// Hit the token limit
    Length,
    /// The model wants a function executed
    ToolCalls,
    /// Output withheld by the provider
    ContentFilter,
    /// Anything else the backend reports
    Other(String),
}

impl FinishReason {
    /// Parse a provider finish reason string
    pub fn parse(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            // Legacy function-calling backends report "function_call"
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Fragment of a streamed function call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Position of the call within the response
    pub index: usize,
    /// Call id (usually only on the first fragment)
    pub id: Option<String>,
    /// Function name (usually only on the first fragment)
    pub name: Option<String>,
    /// Next piece of the argument JSON string
    pub arguments: Option<String>,
}

/// One normalized streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text delta
    pub content: Option<String>,
    /// Function call fragments
    pub tool_calls: Vec<ToolCallFragment>,
    /// Set on the final chunk of a response
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// A chunk carrying only text
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A chunk carrying one function call fragment
    pub fn tool_call(name: Option<&str>, arguments: Option<&str>) -> Self {
        Self {
            tool_calls: vec![ToolCallFragment {
                index: 0,
                id: None,
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }],
            ..Default::default()
        }
    }

    /// A chunk carrying only a finish reason
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }
}

/// Tool definition for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Input schema (JSON Schema)
    pub input_schema: ToolInputSchema,
}

/// Input schema for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Property definitions
    pub properties: serde_json::Value,

    /// Required properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// How the model should choose to use tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Let the model decide
    #[default]
    Auto,
    /// Don't use any tools
    None,
    /// Must use a tool
    Required,
    /// Use a specific tool
    Specific(String),
}
