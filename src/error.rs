// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for sgpt
//!
//! This module defines all error types used throughout the application.

use thiserror::Error;

/// Main error type for sgpt operations
#[derive(Error, Debug)]
pub enum SgptError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The model produced arguments that are not a JSON object
    #[error("Invalid arguments for function '{name}': {message}")]
    ToolArguments { name: String, message: String },

    /// The model asked for a function that is not registered
    #[error("Unknown function: {0}")]
    ToolNotFound(String),

    /// The model kept calling functions past the configured limit
    #[error("Function call limit reached: more than {0} function calls in one turn")]
    ToolLoopLimit(usize),

    /// Response cache storage errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// The operator interrupted the current turn
    #[error("Interrupted")]
    Interrupted,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for sgpt operations
pub type Result<T> = std::result::Result<T, SgptError>;

impl SgptError {
    /// Whether this error is the operator interrupt signal
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SgptError::Interrupted)
    }
}
