// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Function call execution
//!
//! Runs one completed function call: renders it, optionally asks the
//! operator, executes it, and records the call and its result in the
//! message history. Everything shown to the operator is yielded as text
//! fragments on the same stream as the model's reply.

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::TOOL_CALL_MARKER;
use crate::chat::streaming::PendingToolCall;
use crate::error::{Result, SgptError};
use crate::llm::message::{Message, MessageHistory};
use crate::tools::{Confirmer, PermissionRequest, ToolContext, ToolOutput, ToolRegistry};

/// Function message content recorded when the operator says no
pub const DECLINED_MESSAGE: &str = "The user declined to execute this function.";

/// Shown to the operator after declining
pub const ABORTED_NOTICE: &str = "Function call aborted by user.\n";

/// Whether function calls need operator approval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    /// Ask before every call
    #[default]
    Confirmed,
    /// Run without asking
    Unattended,
}

/// Executes function calls on behalf of the chat engine
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    confirmer: Arc<dyn Confirmer>,
    context: ToolContext,
    mode: InvocationMode,
    show_output: bool,
    output_log: Option<PathBuf>,
}

impl ToolInvoker {
    pub fn new(
        registry: Arc<ToolRegistry>,
        confirmer: Arc<dyn Confirmer>,
        context: ToolContext,
    ) -> Self {
        Self {
            registry,
            confirmer,
            context,
            mode: InvocationMode::default(),
            show_output: false,
            output_log: None,
        }
    }

    /// Set the invocation mode
    pub fn with_mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Echo each function result to the operator
    pub fn with_show_output(mut self, show_output: bool) -> Self {
        self.show_output = show_output;
        self
    }

    /// Also write each function result to this file
    pub fn with_output_log(mut self, path: Option<PathBuf>) -> Self {
        self.output_log = path;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    /// Run one function call.
    ///
    /// Malformed arguments and unknown functions fail before anything is
    /// appended to `history`. A tool-level failure is not an error: it
    /// becomes the function message content.
    pub fn invoke<'a>(
        &'a self,
        history: &'a mut MessageHistory,
        call: PendingToolCall,
    ) -> impl Stream<Item = Result<String>> + 'a {
        async_stream::try_stream! {
            let arguments = parse_arguments(&call.name, &call.arguments)?;
            let tool = self
                .registry
                .get(&call.name)
                .ok_or_else(|| SgptError::ToolNotFound(call.name.clone()))?;

            let rendered = format_call(&call.name, &arguments);
            yield format!("> {} `{}` \n\n", TOOL_CALL_MARKER, rendered);

            history.push(Message::function_call(call.to_function_call()));

            let approved = match self.mode {
                InvocationMode::Unattended => true,
                InvocationMode::Confirmed => {
                    let request = PermissionRequest {
                        tool_name: call.name.clone(),
                        action_description: rendered.clone(),
                    };
                    self.confirmer.confirm(&request).await?
                }
            };

            if approved {
                tracing::debug!(target: "sgpt.tools", tool = %call.name, "executing function");
                let output = match tool.execute(Value::Object(arguments), &self.context).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!(target: "sgpt.tools", tool = %call.name, error = %e, "function failed");
                        ToolOutput::error(e.to_string())
                    }
                };
                let content = output.render();

                yield self.acknowledge(&call.name, &content);
                if self.show_output {
                    yield format!("```text\n{}\n```\n", content);
                }

                history.push(Message::function_result(&call.name, content, call.id.clone()));
            } else {
                tracing::debug!(target: "sgpt.tools", tool = %call.name, "function declined");
                history.push(Message::function_result(&call.name, DECLINED_MESSAGE, call.id.clone()));
                yield ABORTED_NOTICE.to_string();
            }
        }
    }

    fn acknowledge(&self, name: &str, content: &str) -> String {
        match &self.output_log {
            Some(path) => match std::fs::write(path, content) {
                Ok(()) => format!(
                    "[Function {} executed, output written to {}]\n",
                    name,
                    path.display()
                ),
                Err(e) => {
                    tracing::warn!(target: "sgpt.tools", path = %path.display(), error = %e, "cannot write function output log");
                    format!("[Function {} executed]\n", name)
                }
            },
            None => format!("[Function {} executed]\n", name),
        }
    }
}

/// Parse the streamed argument string. Blank means no arguments.
pub fn parse_arguments(name: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SgptError::ToolArguments {
            name: name.to_string(),
            message: format!("expected a JSON object, got {}", other),
        }),
        Err(e) => Err(SgptError::ToolArguments {
            name: name.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Render a call as `name(key="value", n=1)`
pub fn format_call(name: &str, arguments: &Map<String, Value>) -> String {
    let joined = arguments
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}=\"{}\"", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}({})", name, joined)
}
