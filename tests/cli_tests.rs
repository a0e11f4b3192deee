// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use clap::Parser;
use sgpt::cli::{CacheCommands, Cli, Commands};

#[test]
fn test_parse_ask_command() {
    let cli = Cli::try_parse_from(["sgpt", "ask", "what", "time", "is", "it"])
        .expect("Valid command parsing");
    if let Some(Commands::Ask(args)) = cli.command {
        assert_eq!(args.prompt_text(), "what time is it");
    } else {
        panic!("Expected Ask command");
    }
}

#[test]
fn test_parse_ask_with_model() {
    let cli = Cli::try_parse_from(["sgpt", "ask", "-m", "gpt-4o-mini", "hi"])
        .expect("Valid command parsing");
    if let Some(Commands::Ask(args)) = cli.command {
        assert_eq!(args.options.model, Some("gpt-4o-mini".to_string()));
    } else {
        panic!("Expected Ask command");
    }
}

#[test]
fn test_parse_ask_unattended() {
    let cli = Cli::try_parse_from(["sgpt", "ask", "--yes", "list", "files"])
        .expect("Valid command parsing");
    if let Some(Commands::Ask(args)) = cli.command {
        assert!(args.options.yes);
        assert_eq!(args.prompt_text(), "list files");
    } else {
        panic!("Expected Ask command");
    }
}

#[test]
fn test_parse_repl_command() {
    let cli = Cli::try_parse_from(["sgpt", "repl", "--no-stream"]).expect("Valid command parsing");
    if let Some(Commands::Repl(args)) = cli.command {
        assert!(args.options.no_stream);
    } else {
        panic!("Expected Repl command");
    }
}

#[test]
fn test_parse_watch_command() {
    let cli = Cli::try_parse_from(["sgpt", "watch", "notes.md", "--model", "gpt-4o-mini"])
        .expect("Valid command parsing");
    if let Some(Commands::Watch(args)) = cli.command {
        assert_eq!(args.paths.len(), 1);
        assert_eq!(args.options.model.as_deref(), Some("gpt-4o-mini"));
    } else {
        panic!("Expected Watch command");
    }
}

#[test]
fn test_parse_cache_clear() {
    let cli = Cli::try_parse_from(["sgpt", "cache", "clear"]).expect("Valid command parsing");
    if let Some(Commands::Cache(args)) = cli.command {
        assert!(matches!(args.command, CacheCommands::Clear));
    } else {
        panic!("Expected Cache command");
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["sgpt", "functions", "-v", "--config", "/tmp/s.json"])
        .expect("Valid command parsing");
    assert_eq!(cli.verbose, 1);
    assert!(cli.config.is_some());
    assert!(matches!(cli.command, Some(Commands::Functions)));
}

#[test]
fn test_unknown_command_fails() {
    assert!(Cli::try_parse_from(["sgpt", "frobnicate"]).is_err());
}
