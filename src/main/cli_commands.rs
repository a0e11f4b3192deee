// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::BTreeSet;
use std::io;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use sgpt::cache::ResponseCache;
use sgpt::cli::{CacheArgs, CacheCommands};
use sgpt::config::Settings;
use sgpt::error::Result;

use super::session::build_registry;

/// Show or clear the response cache
pub(super) fn run_cache_command(args: CacheArgs, settings: &Settings) -> Result<()> {
    let cache = ResponseCache::new(settings.cache_dir(), settings.cache.length)?;
    match args.command {
        CacheCommands::Stats => {
            println!("Location: {}", cache.dir().display());
            println!("Entries:  {} / {}", cache.len()?, cache.capacity());
            println!(
                "Caching:  {}",
                if settings.cache.enabled { "enabled" } else { "disabled" }
            );
        }
        CacheCommands::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} cached response(s).", removed);
        }
    }
    Ok(())
}

/// List every function and whether the model is offered it
pub(super) fn run_functions(settings: &Settings) -> Result<()> {
    let registry = build_registry(settings);
    let offered: BTreeSet<String> = registry.schemas().into_iter().map(|d| d.name).collect();
    let mut stdout = io::stdout();

    for name in registry.names() {
        let Some(tool) = registry.get(name) else {
            continue;
        };
        let enabled = settings.functions.enabled && offered.contains(name);

        stdout.execute(SetForegroundColor(if enabled {
            Color::Cyan
        } else {
            Color::DarkGrey
        }))?;
        print!("{}", name);
        stdout.execute(ResetColor)?;
        if !enabled {
            print!(" (disabled)");
        }
        println!();
        println!("  {}", tool.definition().description);
    }
    Ok(())
}
