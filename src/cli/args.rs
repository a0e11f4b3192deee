// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for sgpt.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sgpt - LLM assistant for your terminal
#[derive(Parser, Debug)]
#[command(name = "sgpt")]
#[command(version, about = "LLM assistant for your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to $SGPT_HOME/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question
    Ask(AskArgs),

    /// Start an interactive session (default when no command given)
    Repl(ReplArgs),

    /// Watch files and chat about their changes
    Watch(WatchArgs),

    /// Inspect or clear the response cache
    Cache(CacheArgs),

    /// List the functions the model may call
    Functions,
}

/// Per-invocation overrides for completion requests
#[derive(clap::Args, Debug, Default, Clone)]
pub struct CompletionArgs {
    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature (0-2)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling (0-1)
    #[arg(long = "top-p")]
    pub top_p: Option<f32>,

    /// Custom system prompt
    #[arg(long)]
    pub role: Option<String>,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Print the answer only once it is complete
    #[arg(long)]
    pub no_stream: bool,

    /// Run functions without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Do not offer any functions to the model
    #[arg(long)]
    pub no_functions: bool,
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// Append stdin to the prompt
    #[arg(long)]
    pub stdin: bool,

    #[command(flatten)]
    pub options: CompletionArgs,
}

impl AskArgs {
    /// The prompt words joined into one string
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Arguments for the repl subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ReplArgs {
    #[command(flatten)]
    pub options: CompletionArgs,
}

/// Arguments for the watch subcommand
#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Files or directories to watch
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub options: CompletionArgs,
}

/// Arguments for cache management
#[derive(clap::Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache location and entry count
    Stats,
    /// Delete every cached response
    Clear,
}
