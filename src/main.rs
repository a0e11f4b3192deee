// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! sgpt - LLM assistant for your terminal
//!
//! Entry point for the sgpt CLI application.

use clap::Parser;

use sgpt::cli::{Cli, Commands, ReplArgs};
use sgpt::config::Settings;
use sgpt::error::Result;

#[path = "main/cli_commands.rs"]
mod cli_commands;
#[path = "main/session.rs"]
mod session;

use cli_commands::{run_cache_command, run_functions};
use session::{run_ask, run_repl, run_watch};

/// Debug targets enabled by `-v`
const VERBOSE_TARGETS: &[&str] = &[
    "sgpt.chat.engine",
    "sgpt.chat.stream",
    "sgpt.cache",
    "sgpt.tools",
    "sgpt.llm.openai",
    "sgpt.watch",
    "sgpt.config",
    "sgpt.cli",
];

fn init_tracing(verbose: u8) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on sgpt diagnostics, `-vv` and up go to trace. `RUST_LOG`
    // still applies to everything else.
    if verbose > 0 {
        let level = if verbose > 1 { "trace" } else { "debug" };
        for target in VERBOSE_TARGETS {
            if let Ok(parsed) = format!("{}={}", target, level).parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    // Answers stream on stdout, so logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load_effective(cli.config.as_deref())?;

    match cli.command {
        None => run_repl(ReplArgs::default(), &settings).await?,
        Some(Commands::Ask(args)) => run_ask(args, &settings).await?,
        Some(Commands::Repl(args)) => run_repl(args, &settings).await?,
        Some(Commands::Watch(args)) => run_watch(args, &settings).await?,
        Some(Commands::Cache(args)) => run_cache_command(args, &settings)?,
        Some(Commands::Functions) => run_functions(&settings)?,
    }

    Ok(())
}
