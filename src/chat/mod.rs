// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat turn handling
//!
//! The completion engine, the stream decoder it drives, and the printer
//! that renders its output.

pub mod display;
pub mod engine;
pub mod streaming;

pub use display::{parse_color, Printer};
pub use engine::{AgentConfig, ChatEngine, LegOutcome, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_ROLE};
pub use streaming::{decode_stream, DecodeStep, PendingToolCall, StreamDecoder, StreamStats};
