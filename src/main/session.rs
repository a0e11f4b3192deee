// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Read, Write};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use sgpt::cache::ResponseCache;
use sgpt::chat::{parse_color, AgentConfig, ChatEngine, Printer, DEFAULT_ROLE};
use sgpt::cli::{AskArgs, CompletionArgs, LineReader, ReplArgs, WatchArgs};
use sgpt::config::Settings;
use sgpt::error::{Result, SgptError};
use sgpt::llm::message::MessageHistory;
use sgpt::llm::provider::CompletionTransport;
use sgpt::llm::providers::OpenAiTransport;
use sgpt::tools::builtin::ShellTool;
use sgpt::tools::{
    InvocationMode, TerminalConfirmer, ToolContext, ToolFilter, ToolInvoker, ToolRegistry,
};
use sgpt::watch::{FileWatcher, FilesView};

/// First prompt of a watch session
const WATCH_GREETING: &str = "Let's start the REPL. Ask me about the watched files!";

/// Registry with the built-in tools, filtered per settings
pub(super) fn build_registry(settings: &Settings) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_filter(ToolFilter {
        enabled: settings.functions.enabled_functions.clone(),
        disabled: settings.functions.disabled_functions.clone(),
    });
    registry.register(Arc::new(
        ShellTool::new().with_timeout(settings.functions.shell_timeout),
    ));
    registry
}

/// Settings plus per-invocation flags
pub(super) fn agent_config(settings: &Settings, options: &CompletionArgs) -> Result<AgentConfig> {
    let temperature = options.temperature.unwrap_or(settings.defaults.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(SgptError::InvalidInput(format!(
            "temperature must be between 0 and 2, got {}",
            temperature
        )));
    }
    let top_p = options.top_p.unwrap_or(settings.defaults.top_p);
    if !(0.0..=1.0).contains(&top_p) {
        return Err(SgptError::InvalidInput(format!(
            "top-p must be between 0 and 1, got {}",
            top_p
        )));
    }

    let role = options
        .role
        .clone()
        .or_else(|| settings.defaults.role.clone())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());
    let functions_off = options.no_functions || !settings.functions.enabled;

    Ok(AgentConfig::default()
        .with_role(role)
        .with_model(
            options
                .model
                .clone()
                .unwrap_or_else(|| settings.defaults.model.clone()),
        )
        .with_temperature(temperature)
        .with_top_p(top_p)
        .with_caching(settings.cache.enabled && !options.no_cache)
        .with_allowed_tools(functions_off.then(Vec::new))
        .with_max_tool_rounds(settings.functions.max_rounds)
        .with_request_timeout(settings.request_timeout()))
}

pub(super) fn build_engine(
    settings: &Settings,
    config: AgentConfig,
    unattended: bool,
    input: LineReader,
) -> Result<ChatEngine> {
    let transport: Arc<dyn CompletionTransport> = Arc::new(OpenAiTransport::with_base_url(
        settings.api_key()?,
        settings.api_base_url(),
    ));
    let cache = Arc::new(
        ResponseCache::new(settings.cache_dir(), settings.cache.length)?
            .with_write_policy(settings.cache.write_policy),
    );

    let mode = if unattended {
        InvocationMode::Unattended
    } else {
        InvocationMode::Confirmed
    };
    let invoker = ToolInvoker::new(
        Arc::new(build_registry(settings)),
        Arc::new(TerminalConfirmer::new(input)),
        ToolContext::new(std::env::current_dir()?),
    )
    .with_mode(mode)
    .with_show_output(settings.functions.show_output)
    .with_output_log(settings.functions.output_log.clone());

    tracing::debug!(
        target: "sgpt.chat.engine",
        model = %config.model,
        caching = config.caching,
        ?mode,
        "engine ready"
    );
    Ok(ChatEngine::new(transport, cache, invoker, config))
}

fn printer(settings: &Settings, options: &CompletionArgs) -> Result<Printer> {
    let color = parse_color(&settings.defaults.color)?;
    Ok(
        Printer::from_streaming_disabled(settings.defaults.disable_streaming || options.no_stream)
            .with_color(color),
    )
}

/// Run one turn, printing as it streams. Ctrl-C ends the turn, not the process.
async fn run_turn(
    engine: &ChatEngine,
    history: &mut MessageHistory,
    prompt: &str,
    printer: &Printer,
) -> Result<()> {
    let interrupt = engine.interrupt_flag();
    let mut stdout = io::stdout();
    let stream = engine.handle(history, prompt);

    tokio::select! {
        result = printer.render(stream, &mut stdout) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            interrupt.store(true, Ordering::SeqCst);
            println!();
            tracing::debug!(target: "sgpt.chat.engine", "interrupted by operator");
        }
    }
    Ok(())
}

fn print_error(error: &SgptError) -> Result<()> {
    let mut stderr = io::stderr();
    stderr.execute(SetForegroundColor(Color::Red))?;
    eprintln!("Error: {}", error);
    stderr.execute(ResetColor)?;
    Ok(())
}

/// Read one line; `None` at end of input
async fn read_user_input(input: &LineReader) -> Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!(">>> ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    Ok(input.next_line().await.map(|line| line.trim().to_string()))
}

fn is_exit(input: &str) -> bool {
    matches!(input, "exit" | "exit()" | "quit")
}

/// Answer a single prompt
pub(super) async fn run_ask(args: AskArgs, settings: &Settings) -> Result<()> {
    let mut prompt = args.prompt_text();
    if args.stdin {
        let mut piped = String::new();
        io::stdin().read_to_string(&mut piped)?;
        if !piped.trim().is_empty() {
            prompt = if prompt.is_empty() {
                piped
            } else {
                format!("{}\n\n{}", prompt, piped)
            };
        }
    }
    if prompt.trim().is_empty() {
        return Err(SgptError::InvalidInput("prompt is empty".to_string()));
    }

    let config = agent_config(settings, &args.options)?;
    let engine = build_engine(settings, config, args.options.yes, LineReader::stdin()?)?;
    let mut history = MessageHistory::new();
    run_turn(&engine, &mut history, &prompt, &printer(settings, &args.options)?).await
}

/// Interactive session; errors end the turn, not the session
pub(super) async fn run_repl(args: ReplArgs, settings: &Settings) -> Result<()> {
    let config = agent_config(settings, &args.options)?;
    let input = LineReader::stdin()?;
    let engine = build_engine(settings, config, args.options.yes, input.clone())?;
    let printer = printer(settings, &args.options)?;
    let mut history = MessageHistory::new();

    println!("sgpt v{} (exit() or Ctrl-D to quit)", env!("CARGO_PKG_VERSION"));
    while let Some(line) = read_user_input(&input).await? {
        if line.is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }
        if let Err(e) = run_turn(&engine, &mut history, &line, &printer).await {
            print_error(&e)?;
        }
    }
    Ok(())
}

/// Chat about watched files; the system prompt follows their changes
pub(super) async fn run_watch(args: WatchArgs, settings: &Settings) -> Result<()> {
    let view = Arc::new(Mutex::new(FilesView::open(&args.paths)?));
    let handle = FileWatcher::new(Arc::clone(&view)).start()?;

    let config = agent_config(settings, &args.options)?
        .with_name("FileGPT")
        .with_caching(false);
    let input = LineReader::stdin()?;
    let engine = build_engine(settings, config, args.options.yes, input.clone())?;
    let printer = printer(settings, &args.options)?;
    let mut history = MessageHistory::new();

    let system_prompt = |view: &Mutex<FilesView>| -> Result<String> {
        view.lock()
            .map(|v| v.system_prompt())
            .map_err(|_| SgptError::Watch("files view lock was poisoned".to_string()))
    };

    {
        let view = view.lock().map_err(|_| SgptError::Watch("files view lock was poisoned".to_string()))?;
        println!("Watching {} file(s):", view.len());
        for path in view.paths() {
            println!("  {}", path.display());
        }
    }

    history.set_system(system_prompt(&view)?);
    if let Err(e) = run_turn(&engine, &mut history, WATCH_GREETING, &printer).await {
        print_error(&e)?;
    }

    while let Some(line) = read_user_input(&input).await? {
        for changed in handle.drain_changes() {
            println!("changed: {}", changed.display());
        }
        if line.is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }
        history.set_system(system_prompt(&view)?);
        if let Err(e) = run_turn(&engine, &mut history, &line, &printer).await {
            print_error(&e)?;
        }
    }

    handle.stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgpt::cache::CacheWritePolicy;

    #[test]
    fn test_agent_config_prefers_flags() {
        let settings = Settings::default();
        let options = CompletionArgs {
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.3),
            no_cache: true,
            no_functions: true,
            ..Default::default()
        };
        let config = agent_config(&settings, &options).unwrap();

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.3);
        assert!(!config.caching);
        assert_eq!(config.allowed_tools, Some(Vec::new()));
        assert_eq!(config.role, DEFAULT_ROLE);
    }

    #[test]
    fn test_agent_config_from_settings() {
        let mut settings = Settings::default();
        settings.defaults.role = Some("Be brief.".to_string());
        let config = agent_config(&settings, &CompletionArgs::default()).unwrap();

        assert_eq!(config.model, settings.defaults.model);
        assert!(config.caching);
        assert!(config.allowed_tools.is_none());
        assert_eq!(config.role, "Be brief.");
    }

    #[test]
    fn test_agent_config_rejects_bad_temperature() {
        let options = CompletionArgs {
            temperature: Some(3.0),
            ..Default::default()
        };
        assert!(agent_config(&Settings::default(), &options).is_err());
    }

    #[test]
    fn test_registry_respects_disabled_functions() {
        let mut settings = Settings::default();
        assert_eq!(build_registry(&settings).schemas().len(), 1);

        settings.functions.disabled_functions = vec![ShellTool::NAME.to_string()];
        let registry = build_registry(&settings);
        assert!(registry.schemas().is_empty());
        assert!(registry.get(ShellTool::NAME).is_some());
    }

    #[test]
    fn test_is_exit() {
        assert!(is_exit("exit()"));
        assert!(is_exit("exit"));
        assert!(!is_exit("exits"));
    }

    #[test]
    fn test_build_engine_uses_configured_write_policy() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.api.api_key = Some("sk-test".to_string());
        settings.cache.path = Some(dir.path().to_path_buf());
        settings.cache.write_policy = CacheWritePolicy::Always;

        let engine = build_engine(
            &settings,
            AgentConfig::default(),
            false,
            LineReader::from_lines(Vec::<String>::new()),
        )
        .unwrap();
        assert_eq!(engine.cache().write_policy(), CacheWritePolicy::Always);
    }

    #[test]
    fn test_printer_follows_settings() {
        let mut settings = Settings::default();
        settings.defaults.disable_streaming = true;
        assert!(!printer(&settings, &CompletionArgs::default()).unwrap().is_live());

        settings.defaults.color = "nope".to_string();
        assert!(printer(&settings, &CompletionArgs::default()).is_err());
    }
}
