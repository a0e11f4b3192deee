// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock completion transport for testing
//!
//! Replays scripted chunk sequences, one per request, and records every
//! request it receives.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{ApiError, Result, SgptError};
use crate::llm::provider::{
    ChunkStream, CompletionRequest, CompletionTransport, FinishReason, StreamChunk,
};

/// A scripted reply to one request
#[derive(Debug)]
pub enum MockResponse {
    /// Yield these chunks, then end
    Chunks(Vec<StreamChunk>),
    /// Yield whatever the test pushes through the channel, ending when it closes
    Live(mpsc::UnboundedReceiver<StreamChunk>),
    /// Fail the request itself
    Error(String),
}

/// A mock transport for testing
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock transport lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response made of raw chunks
    pub fn with_chunks(self, chunks: Vec<StreamChunk>) -> Self {
        lock(&self.responses).push_back(MockResponse::Chunks(chunks));
        self
    }

    /// Queue a plain text response split into the given deltas
    pub fn with_text_response(self, deltas: &[&str]) -> Self {
        let mut chunks: Vec<StreamChunk> = deltas.iter().map(|d| StreamChunk::text(*d)).collect();
        chunks.push(StreamChunk::finish(FinishReason::Stop));
        self.with_chunks(chunks)
    }

    /// Queue a function call whose arguments arrive in the given fragments
    pub fn with_tool_call(self, name: &str, argument_fragments: &[&str]) -> Self {
        let mut chunks = vec![StreamChunk::tool_call(Some(name), None)];
        chunks.extend(
            argument_fragments
                .iter()
                .map(|f| StreamChunk::tool_call(None, Some(f))),
        );
        chunks.push(StreamChunk::finish(FinishReason::ToolCalls));
        self.with_chunks(chunks)
    }

    /// Queue a response fed live through the returned sender
    pub fn with_live_response(self) -> (Self, mpsc::UnboundedSender<StreamChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.responses).push_back(MockResponse::Live(rx));
        (self, tx)
    }

    /// Queue a request failure
    pub fn with_error(self, message: impl Into<String>) -> Self {
        lock(&self.responses).push_back(MockResponse::Error(message.into()));
        self
    }

    /// Number of requests received
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// All recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// The last request received
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }
}

#[async_trait]
impl CompletionTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded_requests).push(request);

        let response = lock(&self.responses).pop_front();
        match response {
            Some(MockResponse::Chunks(chunks)) => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(Ok::<StreamChunk, SgptError>),
            ))),
            Some(MockResponse::Live(rx)) => {
                Ok(Box::pin(UnboundedReceiverStream::new(rx).map(Ok)))
            }
            Some(MockResponse::Error(message)) => Err(SgptError::Api(ApiError::ServerError {
                status: 500,
                message,
            })),
            None => Err(SgptError::Api(ApiError::InvalidResponse(
                "mock transport has no scripted response left".to_string(),
            ))),
        }
    }
}
