// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for sgpt
//!
//! Tools are local actions the model may call through the chat API's
//! function-calling mechanism. The [`ToolRegistry`] exposes their schemas
//! and the [`ToolInvoker`] runs one call and records it in history.

pub mod builtin;
pub mod definition;
pub mod invoker;
pub mod permission;

pub use definition::*;
pub use invoker::*;
pub use permission::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Current working directory
    pub working_directory: PathBuf,
}

impl ToolContext {
    pub fn new(working_directory: PathBuf) -> Self {
        Self { working_directory }
    }
}

/// Output from a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, passed to the model as-is
    Text(String),
    /// JSON result, normally `{"status": "success"|"error", ...}`
    Structured(Value),
}

impl ToolOutput {
    /// Successful structured result
    pub fn success(content: impl Into<String>) -> Self {
        ToolOutput::Structured(serde_json::json!({
            "status": "success",
            "content": content.into(),
        }))
    }

    /// Failed structured result
    pub fn error(message: impl Into<String>) -> Self {
        ToolOutput::Structured(serde_json::json!({
            "status": "error",
            "message": message.into(),
        }))
    }

    /// Whether the tool reported an error status
    pub fn is_error(&self) -> bool {
        match self {
            ToolOutput::Structured(value) => value.get("status") == Some(&Value::from("error")),
            ToolOutput::Text(_) => false,
        }
    }

    /// Render the result as the content of a function message
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Structured(Value::Object(map)) => {
                match map.get("status").and_then(Value::as_str) {
                    Some("error") => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("An unknown error occurred.")
                        .to_string(),
                    Some("success") => {
                        let content = map.get("content").map(value_text).unwrap_or_default();
                        match map.get("file_hash").and_then(Value::as_str) {
                            Some(hash) => format!("[File Hash: {}]\n\n{}", hash, content),
                            None => content,
                        }
                    }
                    _ => "Unexpected response structure received.".to_string(),
                }
            }
            ToolOutput::Structured(other) => value_text(other),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool definition for the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with parsed JSON arguments
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput>;
}

/// Allow/deny lists deciding which tool schemas are offered to the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFilter {
    /// If non-empty, only these tools are offered
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Never offered, even when enabled
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl ToolFilter {
    /// Whether a tool passes the filter
    pub fn allows(&self, name: &str) -> bool {
        let enabled = self.enabled.is_empty() || self.enabled.iter().any(|n| n == name);
        enabled && !self.disabled.iter().any(|n| n == name)
    }
}

/// Registry of available tools
///
/// Kept ordered by name so exported schemas serialize identically run to
/// run.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    filter: ToolFilter,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Set the allow/deny filter
    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of every registered tool
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Definitions the filter lets through
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|tool| self.filter.allows(tool.name()))
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
