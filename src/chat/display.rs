// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Output rendering for answer streams
//!
//! A [`Printer`] drains a fragment stream into any `io::Write`, either as
//! the fragments arrive or all at once when streaming output is disabled.

use std::io::Write;

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::QueueableCommand;
use futures::{Stream, StreamExt};

use crate::error::{Result, SgptError};

/// Resolve a color name from settings. "none" or an empty name means plain text.
pub fn parse_color(name: &str) -> Result<Option<Color>> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name == "none" {
        return Ok(None);
    }
    Color::try_from(name.as_str())
        .map(Some)
        .map_err(|_| SgptError::Config(format!("unknown color {:?}", name)))
}

/// Renders answer fragments to a writer
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    live: bool,
    color: Option<Color>,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            live: true,
            color: None,
        }
    }
}

impl Printer {
    /// Printer that writes each fragment as soon as it arrives
    pub fn live() -> Self {
        Self::default()
    }

    /// Printer that writes the whole answer once the stream ends
    pub fn buffered() -> Self {
        Self {
            live: false,
            color: None,
        }
    }

    /// Pick live or buffered from the `DISABLE_STREAMING` setting
    pub fn from_streaming_disabled(disabled: bool) -> Self {
        if disabled {
            Self::buffered()
        } else {
            Self::live()
        }
    }

    pub fn with_color(mut self, color: Option<Color>) -> Self {
        self.color = color;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    fn write_fragment<W: Write>(&self, out: &mut W, fragment: &str) -> Result<()> {
        match self.color {
            Some(color) => {
                out.queue(SetForegroundColor(color))?;
                out.write_all(fragment.as_bytes())?;
                out.queue(ResetColor)?;
            }
            None => out.write_all(fragment.as_bytes())?,
        }
        Ok(())
    }

    /// Drain `stream` into `out` and return the full text.
    ///
    /// In buffered mode nothing is written if the stream fails.
    pub async fn render<S, W>(&self, stream: S, out: &mut W) -> Result<String>
    where
        S: Stream<Item = Result<String>>,
        W: Write,
    {
        let mut stream = std::pin::pin!(stream);
        let mut full_text = String::new();

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if self.live {
                self.write_fragment(out, &fragment)?;
                out.flush()?;
            }
            full_text.push_str(&fragment);
        }

        if !self.live {
            self.write_fragment(out, &full_text)?;
        }
        if !full_text.is_empty() && !full_text.ends_with('\n') {
            out.write_all(b"\n")?;
        }
        out.flush()?;

        Ok(full_text)
    }
}
