// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Operator confirmation for function calls

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::cli::LineReader;
use crate::error::Result;

/// Prompt shown before a confirmed function call runs
pub const CONFIRMATION_PROMPT: &str = "Are you sure you want to run this function? [y/n]:";

/// Request for permission to run a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Name of the function
    pub tool_name: String,
    /// Human-readable rendering of the call
    pub action_description: String,
}

/// Something that can approve or decline a function call
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Wait for the operator's answer; `true` means run it
    async fn confirm(&self, request: &PermissionRequest) -> Result<bool>;
}

/// Asks on the terminal, reading the answer from the shared line input
#[derive(Debug, Clone)]
pub struct TerminalConfirmer {
    input: LineReader,
}

impl TerminalConfirmer {
    pub fn new(input: LineReader) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, request: &PermissionRequest) -> Result<bool> {
        let mut stdout = io::stdout();

        stdout.execute(SetForegroundColor(Color::Yellow))?;
        print!("{} ", CONFIRMATION_PROMPT);
        stdout.execute(ResetColor)?;
        stdout.flush()?;

        // End of input declines
        let answer = self.input.next_line().await.unwrap_or_default();
        let approved = parse_answer(&answer);
        tracing::debug!(target: "sgpt.tools", tool = %request.tool_name, approved, "confirmation answered");
        Ok(approved)
    }
}

/// Anything other than an explicit yes declines
pub fn parse_answer(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Replays canned answers and records what it was asked
///
/// Once the queue is exhausted every further request is declined, unless
/// the confirmer approves everything.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    approve_all: bool,
    requests: Mutex<Vec<PermissionRequest>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            approve_all: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Approve every request
    pub fn approving() -> Self {
        Self {
            approve_all: true,
            ..Self::default()
        }
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<PermissionRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &PermissionRequest) -> Result<bool> {
        match self.requests.lock() {
            Ok(mut guard) => guard.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        let answer = match self.answers.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Ok(answer.unwrap_or(self.approve_all))
    }
}
