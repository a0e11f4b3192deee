// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shell command execution tool
//!
//! Executes shell commands with a timeout and a small blocklist.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Result, SgptError};
use crate::llm::provider::ToolDefinition;
use crate::tools::{SchemaBuilder, Tool, ToolContext, ToolOutput};

const MAX_STDOUT_BYTES: usize = 30_000;
const MAX_STDERR_BYTES: usize = 10_000;
const MAX_TIMEOUT_SECS: u64 = 600;

/// Tool for executing shell commands
pub struct ShellTool {
    /// Substrings that are always refused
    blocked_patterns: Vec<&'static str>,
    /// Default timeout in seconds
    default_timeout: u64,
}

impl ShellTool {
    pub const NAME: &'static str = "execute_shell_command";

    pub fn new() -> Self {
        Self {
            blocked_patterns: vec![
                "rm -rf /",
                "mkfs",
                ":(){:|:&};:",
                "> /dev/sda",
                "dd if=/dev/zero of=/dev",
                "shutdown",
                "reboot",
                "poweroff",
            ],
            default_timeout: 60,
        }
    }

    /// Override the default timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.default_timeout = seconds;
        self
    }

    fn is_blocked(&self, command: &str) -> bool {
        let lower = command.to_lowercase();
        self.blocked_patterns.iter().any(|p| lower.contains(p))
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut bytes = Vec::new();
    let _ = reader.read_to_end(&mut bytes).await;
    String::from_utf8_lossy(&bytes).into_owned()
}

fn push_section(out: &mut String, label: &str, body: &str, limit: usize) {
    if body.is_empty() {
        return;
    }
    out.push_str(&format!("\n--- {} ---\n", label));
    if body.len() > limit {
        let mut cut = limit;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&body[..cut]);
        out.push_str("\n... (output truncated)");
    } else {
        out.push_str(body);
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "Execute a shell command and return its exit code and output. \
             Use it to inspect files, directories and the system.",
            SchemaBuilder::new()
                .string("command", "The shell command to execute", true)
                .integer("timeout", "Timeout in seconds (default: 60, max: 600)", false)
                .build(),
        )
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| SgptError::InvalidInput("command is required".to_string()))?;

        let timeout_secs = input["timeout"]
            .as_u64()
            .unwrap_or(self.default_timeout)
            .min(MAX_TIMEOUT_SECS);

        if self.is_blocked(command) {
            return Ok(ToolOutput::error(
                "This command has been blocked for safety reasons.",
            ));
        }

        // stdin is null so commands never wait on the terminal we prompt on
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&context.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return Ok(ToolOutput::error(format!("Failed to spawn command: {}", e))),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let result = timeout(Duration::from_secs(timeout_secs), async {
            let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
            child.wait().await.map(|status| (status, stdout, stderr))
        })
        .await;

        match result {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code().unwrap_or(-1);
                let mut text = format!("Exit code: {}\n", exit_code);
                push_section(&mut text, "stdout", &stdout, MAX_STDOUT_BYTES);
                push_section(&mut text, "stderr", &stderr, MAX_STDERR_BYTES);
                tracing::debug!(target: "sgpt.tools", exit_code, "shell command finished");
                Ok(ToolOutput::success(text))
            }
            Ok(Err(e)) => Ok(ToolOutput::error(format!("Failed to execute command: {}", e))),
            Err(_) => Ok(ToolOutput::error(format!(
                "Command timed out after {} seconds",
                timeout_secs
            ))),
        }
    }
}
