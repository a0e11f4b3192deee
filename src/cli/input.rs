// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Line input shared by the REPL prompt and function confirmations
//!
//! A single background thread owns stdin and forwards each line over a
//! channel. Awaiting a line never blocks the runtime, and a wait that is
//! cancelled (e.g. by Ctrl-C) loses no input.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, SgptError};

/// Cloneable handle to a stream of input lines
#[derive(Debug, Clone)]
pub struct LineReader {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl LineReader {
    /// Start reading stdin on a background thread
    pub fn stdin() -> Result<Self> {
        let (tx, reader) = Self::channel();
        thread::Builder::new()
            .name("sgpt-stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(target: "sgpt.cli", error = %e, "stdin read failed");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SgptError::InvalidInput(format!("cannot read stdin: {}", e)))?;
        Ok(reader)
    }

    /// Reader fed by the returned sender; input ends when it is dropped
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::from_receiver(rx))
    }

    /// Serve a fixed list of lines, then end of input
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, reader) = Self::channel();
        for line in lines {
            // The receiver is still alive here
            let _ = tx.send(line.into());
        }
        reader
    }

    fn from_receiver(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line without its terminator; `None` at end of input
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}
