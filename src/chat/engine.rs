// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion orchestration.
//!
//! One turn runs as a bounded loop of "legs". Each leg is a single
//! streaming request served through the response cache; when the model
//! asks for a function, the tool invoker runs it inside the same leg and
//! the loop re-issues the request with the result appended and caching
//! forced off. A leg that resolves no function call ends the turn.

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::chat::streaming::{decode_stream, DecodeStep};
use crate::error::{Result, SgptError};
use crate::llm::message::{Message, MessageHistory};
use crate::llm::provider::{
    CompletionRequest, CompletionTransport, ToolChoice, ToolDefinition, DEFAULT_REQUEST_TIMEOUT,
};
use crate::tools::{ToolInvoker, DECLINED_MESSAGE};

/// Default cap on function calls per turn
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Default system prompt
pub const DEFAULT_ROLE: &str = "You are a command-line assistant. \
Answer concisely. When a question needs facts about the local system, \
call the available functions instead of guessing.";

/// Everything that distinguishes one assistant persona from another
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Display name
    pub name: String,
    /// System prompt used when the history has none
    pub role: String,
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Narrow the registry's schemas to these names (`None` = all)
    pub allowed_tools: Option<Vec<String>>,
    /// Serve and store the first leg of each turn through the cache
    pub caching: bool,
    /// Tool choice sent with every request that offers tools
    pub tool_choice: ToolChoice,
    /// Continuation requests allowed per turn
    pub max_tool_rounds: usize,
    /// Transport timeout per request
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            role: DEFAULT_ROLE.to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            allowed_tools: None,
            caching: true,
            tool_choice: ToolChoice::Auto,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AgentConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_allowed_tools(mut self, allowed: Option<Vec<String>>) -> Self {
        self.allowed_tools = allowed;
        self
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// How a leg ended, read back from the history it appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// Plain text reply; the turn is over
    Reply,
    /// A function ran; ask the model again with its result
    ToolResolved,
    /// The operator refused the function; the turn is over
    Declined,
}

/// Classify a finished leg by what it appended after `before`
pub fn leg_outcome(history: &MessageHistory, before: usize) -> LegOutcome {
    if history.len() == before {
        return LegOutcome::Reply;
    }
    match history.last() {
        Some(last) if last.is_function_result() && last.content == DECLINED_MESSAGE => {
            LegOutcome::Declined
        }
        _ => LegOutcome::ToolResolved,
    }
}

/// Drives completion requests, function calls and caching for a session
pub struct ChatEngine {
    transport: Arc<dyn CompletionTransport>,
    cache: Arc<ResponseCache>,
    invoker: ToolInvoker,
    config: AgentConfig,
    interrupted: Arc<AtomicBool>,
}

impl ChatEngine {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        cache: Arc<ResponseCache>,
        invoker: ToolInvoker,
        config: AgentConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            invoker,
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned interrupt flag (e.g. a Ctrl-C handler's)
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Setting this flag ends the current turn at the next chunk
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Tool schemas offered to the model
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let schemas = self.invoker.registry().schemas();
        match &self.config.allowed_tools {
            Some(allowed) => schemas
                .into_iter()
                .filter(|def| allowed.iter().any(|name| name == &def.name))
                .collect(),
            None => schemas,
        }
    }

    /// Build the request for the current history
    pub fn build_request(&self, history: &MessageHistory) -> CompletionRequest {
        let system = history.system_prompt().unwrap_or(&self.config.role);
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(history.messages().iter().cloned());

        CompletionRequest::new(&self.config.model, messages)
            .with_temperature(self.config.temperature)
            .with_top_p(self.config.top_p)
            .with_tools(self.tool_definitions())
            .with_tool_choice(self.config.tool_choice.clone())
            .with_timeout(self.config.request_timeout)
    }

    /// Run one turn for `prompt`, yielding text as it arrives.
    ///
    /// The user message is appended immediately; the final reply is
    /// appended once its leg completes. An operator interrupt ends the
    /// stream without an error and without appending a reply.
    pub fn handle<'a>(
        &'a self,
        history: &'a mut MessageHistory,
        prompt: &str,
    ) -> impl Stream<Item = Result<String>> + 'a {
        let prompt = prompt.trim().to_string();
        async_stream::try_stream! {
            self.interrupted.store(false, Ordering::SeqCst);
            history.push(Message::user(prompt));

            let mut use_cache = self.config.caching;
            let mut rounds = 0usize;

            loop {
                let request = self.build_request(history);
                let fingerprint = request.fingerprint()?;
                let before = history.len();
                let mut reply = String::new();
                let mut interrupted = false;

                tracing::debug!(
                    target: "sgpt.chat.engine",
                    agent = %self.config.name,
                    model = %request.model,
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    use_cache,
                    round = rounds,
                    "issuing completion"
                );

                {
                    let leg = self.cache.fetch_or_compute(fingerprint, use_cache, || {
                        self.complete_leg(&mut *history, request)
                    });
                    let mut leg = std::pin::pin!(leg);
                    while let Some(fragment) = leg.next().await {
                        match fragment {
                            Ok(text) => {
                                reply.push_str(&text);
                                yield text;
                            }
                            Err(SgptError::Interrupted) => {
                                interrupted = true;
                                break;
                            }
                            Err(e) => Err::<(), SgptError>(e)?,
                        }
                    }
                }

                if interrupted {
                    tracing::debug!(target: "sgpt.chat.engine", "turn interrupted");
                    break;
                }

                match leg_outcome(history, before) {
                    LegOutcome::Reply => {
                        history.push(Message::assistant(reply));
                        break;
                    }
                    LegOutcome::Declined => {
                        tracing::debug!(target: "sgpt.chat.engine", "function declined, ending turn");
                        break;
                    }
                    LegOutcome::ToolResolved => {
                        rounds += 1;
                        if rounds > self.config.max_tool_rounds {
                            Err::<(), SgptError>(SgptError::ToolLoopLimit(self.config.max_tool_rounds))?;
                        }
                        use_cache = false;
                    }
                }
            }
        }
    }

    /// One streaming request: forward text, and run the function call if
    /// the response ends with one.
    fn complete_leg<'a>(
        &'a self,
        history: &'a mut MessageHistory,
        request: CompletionRequest,
    ) -> impl Stream<Item = Result<String>> + 'a {
        async_stream::try_stream! {
            let chunks = self.transport.stream_complete(request).await?;
            let steps = decode_stream(chunks, self.interrupt_flag());
            let mut steps = std::pin::pin!(steps);

            while let Some(step) = steps.next().await {
                match step? {
                    DecodeStep::Text(text) => yield text,
                    DecodeStep::ToolCall(call) => {
                        tracing::debug!(
                            target: "sgpt.chat.engine",
                            tool = %call.name,
                            "model requested function"
                        );
                        let output = self.invoker.invoke(&mut *history, call);
                        let mut output = std::pin::pin!(output);
                        while let Some(fragment) = output.next().await {
                            yield fragment?;
                        }
                    }
                }
            }
        }
    }
}
