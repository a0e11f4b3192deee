// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for sgpt
//!
//! Handles command-line argument parsing and terminal line input.

pub mod args;
pub mod input;

pub use args::*;
pub use input::LineReader;
