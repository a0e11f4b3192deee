// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response decoding
//!
//! Splits a normalized chunk stream into text deltas and at most one
//! completed function call. The pure [`StreamDecoder`] holds the state;
//! [`decode_stream`] drives it over a live transport stream.

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ApiError, Result, SgptError};
use crate::llm::message::FunctionCall;
use crate::llm::provider::{ChunkStream, FinishReason, StreamChunk};

/// A function call being assembled from streamed fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    /// Provider call id, first occurrence wins
    pub id: Option<String>,
    /// Function name, first occurrence wins
    pub name: String,
    /// Argument JSON, fragments appended in arrival order
    pub arguments: String,
}

impl PendingToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Whether no fragment has arrived yet
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_empty() && self.arguments.is_empty()
    }

    /// The call as recorded in history
    pub fn to_function_call(&self) -> FunctionCall {
        FunctionCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Output of decoding one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    /// Text to forward (possibly empty)
    Text(String),
    /// The response finished with a complete function call
    ToolCall(PendingToolCall),
}

/// Accumulator for one streaming response
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: PendingToolCall,
    finish_reason: Option<FinishReason>,
    stats: StreamStats,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The function call assembled so far
    pub fn pending(&self) -> &PendingToolCall {
        &self.pending
    }

    /// The finish reason, once one has been seen
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Process a chunk and return what to forward
    pub fn process_chunk(&mut self, chunk: StreamChunk) -> Result<DecodeStep> {
        for fragment in chunk.tool_calls {
            if self.pending.id.is_none() {
                self.pending.id = fragment.id;
            }
            if let Some(name) = fragment.name {
                if self.pending.name.is_empty() {
                    self.pending.name = name;
                }
            }
            if let Some(arguments) = fragment.arguments {
                self.pending.arguments.push_str(&arguments);
            }
            self.stats.tool_fragment_count += 1;
        }

        if let Some(reason) = chunk.finish_reason {
            self.finish_reason = Some(reason);
        }

        if self.finish_reason == Some(FinishReason::ToolCalls) {
            if self.pending.name.is_empty() {
                return Err(SgptError::Api(ApiError::InvalidResponse(
                    "function call finished without a function name".to_string(),
                )));
            }
            self.stats.tool_call_count += 1;
            return Ok(DecodeStep::ToolCall(std::mem::take(&mut self.pending)));
        }

        let text = chunk.content.unwrap_or_default();
        self.stats.update(&text);
        Ok(DecodeStep::Text(text))
    }
}

/// Statistics about a decoded response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Total text bytes forwarded
    pub total_text_chars: usize,
    /// Number of non-empty text deltas
    pub text_delta_count: usize,
    /// Number of function call fragments absorbed
    pub tool_fragment_count: usize,
    /// Number of completed function calls
    pub tool_call_count: usize,
}

impl StreamStats {
    fn update(&mut self, text: &str) {
        if !text.is_empty() {
            self.total_text_chars += text.len();
            self.text_delta_count += 1;
        }
    }
}

/// Decode a transport stream lazily.
///
/// The interrupt flag is checked before each pull; once set the transport
/// stream is dropped (closing the connection) and `Interrupted` is
/// reported. Decoding ends right after a completed function call.
pub fn decode_stream(
    chunks: ChunkStream,
    interrupted: Arc<AtomicBool>,
) -> impl Stream<Item = Result<DecodeStep>> + Send {
    async_stream::try_stream! {
        let mut chunks = chunks;
        let mut decoder = StreamDecoder::new();
        let mut done = false;

        while !done {
            if interrupted.load(Ordering::SeqCst) {
                tracing::debug!(target: "sgpt.chat.stream", "interrupt observed, closing stream");
                Err::<(), SgptError>(SgptError::Interrupted)?;
            }

            match chunks.next().await {
                Some(chunk) => {
                    let step = decoder.process_chunk(chunk?)?;
                    done = matches!(step, DecodeStep::ToolCall(_));
                    yield step;
                }
                None => done = true,
            }
        }

        if !decoder.pending().is_empty() && decoder.stats().tool_call_count == 0 {
            tracing::debug!(
                target: "sgpt.chat.stream",
                name = %decoder.pending().name,
                "stream ended with an unfinished function call"
            );
        }
        tracing::debug!(
            target: "sgpt.chat.stream",
            chars = decoder.stats().total_text_chars,
            deltas = decoder.stats().text_delta_count,
            tool_calls = decoder.stats().tool_call_count,
            "response decoded"
        );
    }
}
