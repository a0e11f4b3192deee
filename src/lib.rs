// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! sgpt - LLM assistant for the terminal.
//!
//! This crate exposes the runtime used by the `sgpt` CLI (`src/main.rs`):
//! - `chat`: completion engine, stream decoding and output rendering
//! - `cache`: content-addressed response cache
//! - `llm`: message history and the completion transport abstraction
//! - `tools`: callable functions, confirmation and invocation
//! - `watch`: file change tracking for the watch REPL
//! - `config`, `cli`: settings and command-line arguments

pub mod cache;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod tools;
pub mod watch;

pub use error::{Result, SgptError};
