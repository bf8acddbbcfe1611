#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! `ralph` — the reference CLI for the agent execution engine.
//!
//! Two modes, selected by `--subagent` (spec.md §6's "Subagent CLI
//! contract"): the default interactive chat loop, and
//! `--subagent --task <task> [--context <context>]`, which runs one task
//! to completion with no TTY, proxying any gated tool call back to the
//! parent over the pipes exported in `APPROVAL_REQUEST_FD` /
//! `APPROVAL_RESPONSE_FD`, and prints nothing but its final result to
//! stdout.
//!
//! Everything this binary wires together — the `RoundTripClient`, the
//! `OutputSink`s, the `ConversationStore`, config loading, logging — is a
//! reference implementation of the collaborators spec.md §1 declares
//! out of scope for the core; embedders are expected to bring their own.

mod client;
mod session;
mod sink;
mod store;

use std::io::{BufRead, IsTerminal, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use ralph_core::{install_sigint_handler, OutputSink, ToolExecCtx};
use ralph_orchestrator::EndReason;
use ralph_policy::ApprovalConfig;
use ralph_subagent::SubagentManager;
use ralph_tools::DefaultToolRegistry;

use client::AnthropicClient;
use store::JsonlConversationStore;

/// `ralph` mediates every tool call an LLM requests through an approval
/// policy, optionally delegating work to subagent processes.
#[derive(Parser, Debug)]
#[command(name = "ralph", author, version, about)]
struct Cli {
    /// Run as a subagent: execute one task non-interactively and exit.
    /// Set by the subagent supervisor (spec.md §6); passing it by hand
    /// works the same way, just without a parent to proxy approvals to.
    #[arg(long)]
    subagent: bool,

    /// The task text to run to completion. Required with `--subagent`.
    #[arg(long)]
    task: Option<String>,

    /// Extra context text handed to the subagent alongside its task.
    #[arg(long)]
    context: Option<String>,

    /// Output format for the interactive loop's events: `pretty` or `json`.
    #[arg(long, default_value = "pretty")]
    format: String,

    /// Enable debug-level logging, overriding the configured log level.
    #[arg(short, long)]
    verbose: bool,

    /// Load configuration from this file instead of the layered default
    /// search (`/etc/ralph`, `~/.ralph`, `{workspace}/.ralph`).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    install_sigint_handler();

    let workspace_root = std::env::current_dir().ok();
    let config = match &cli.config {
        Some(path) => ralph_config::Config::load_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ralph_config::Config::load(workspace_root.as_deref()).context("loading configuration")?,
    };

    init_logging(&config, cli.verbose);

    if cli.subagent {
        let task = cli.task.clone().context("--subagent requires --task <text>")?;
        run_subagent(&cli, &config, &task)
    } else {
        run_interactive(&cli, &config, workspace_root)
    }
}

fn init_logging(config: &ralph_config::Config, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let base_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let mut directive = base_level.to_string();
    for (target, level) in &config.logging.targets {
        directive.push_str(&format!(",{target}={level}"));
    }
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs always go to stderr, regardless of mode: a subagent's stdout
    // is its captured result (spec.md §6) and must stay clean.
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let result = match config.logging.format {
        ralph_config::LogFormat::Json => builder.json().try_init(),
        ralph_config::LogFormat::Pretty => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: failed to initialize logging: {e}");
    }
}

fn system_prompt_text(config: &ralph_config::Config) -> String {
    format!(
        "You are ralph, an autonomous coding agent driven by {}. \
         Every tool call you request is mediated by an approval policy you cannot see around; \
         a denied or rate-limited call is not a bug, it is the operator's decision.",
        config.model.model
    )
}

fn build_client(config: &ralph_config::Config) -> Result<AnthropicClient> {
    let api_key = std::env::var(&config.model.api_key_env)
        .with_context(|| format!("environment variable {} is not set", config.model.api_key_env))?;
    Ok(AnthropicClient::new(
        api_key,
        config.model.model.clone(),
        config.model.max_tokens,
        config.model.temperature,
        config.model.api_url.clone(),
    ))
}

/// Reads `APPROVAL_REQUEST_FD`/`APPROVAL_RESPONSE_FD`/`PARENT_AGENT_ID`
/// (spec.md §6) and, if both fds parse and are in range, attaches an
/// `ApprovalChannel` to `approval` so gated calls proxy to the parent
/// instead of failing closed.
#[allow(unsafe_code)]
fn attach_approval_channel(approval: &mut ApprovalConfig) {
    let valid_fd = |s: String| s.parse::<i32>().ok().filter(|fd| *fd > 2 && *fd <= i32::MAX);
    let request_fd = std::env::var("APPROVAL_REQUEST_FD").ok().and_then(valid_fd);
    let response_fd = std::env::var("APPROVAL_RESPONSE_FD").ok().and_then(valid_fd);
    let parent_pid = std::env::var("PARENT_AGENT_ID").ok().and_then(|s| s.parse().ok()).unwrap_or(0);

    match (request_fd, response_fd) {
        (Some(request_fd), Some(response_fd)) => {
            // SAFETY: the subagent spawn protocol (spec.md §4.2) hands this
            // process exactly these two fds, open and otherwise unowned,
            // across `exec`, before this code ever runs.
            let channel = unsafe { ralph_policy::ApprovalChannel::from_raw_fds(request_fd, response_fd, parent_pid) };
            approval.approval_channel = Some(channel);
        }
        _ => {
            tracing::warn!(
                "no valid approval-proxy fds; gated tool calls will fail non-interactively (spec.md §6)"
            );
        }
    }
}

/// Runs one `--subagent --task <task>` invocation to completion and
/// prints its result to stdout (spec.md §6's subagent CLI contract).
fn run_subagent(cli: &Cli, config: &ralph_config::Config, task: &str) -> Result<()> {
    let mut approval = ralph_config::policy_bridge::build_approval_config(config, false, &[]);
    attach_approval_channel(&mut approval);

    let registry = DefaultToolRegistry::new();
    let client = build_client(config)?;
    let sink = sink::StderrSink;
    let tool_ctx = ToolExecCtx { is_subagent: true };

    let system_prompt = system_prompt_text(config);
    let mut store = JsonlConversationStore::new(
        Some(&system_prompt),
        config.runtime.context_window_tokens,
        config.runtime.response_reserve_tokens,
        None,
    );

    let user_text = match &cli.context {
        Some(ctx) if !ctx.is_empty() => format!("{task}\n\nAdditional context:\n{ctx}"),
        _ => task.to_string(),
    };

    // A subagent may not spawn further subagents (spec.md §4.2): pass
    // `None` for the supervisor rather than wiring one up at all.
    let reason = session::run_turn(&user_text, &mut store, &client, &sink, &approval, &registry, None, tool_ctx);
    tracing::info!(?reason, "subagent turn ended");

    let result = session::last_assistant_text(&store).unwrap_or_default();
    println!("{result}");
    Ok(())
}

/// Runs the default interactive REPL: one user turn per line read from
/// stdin, until EOF (Ctrl-D) or an unrecoverable turn outcome.
fn run_interactive(cli: &Cli, config: &ralph_config::Config, workspace_root: Option<PathBuf>) -> Result<()> {
    let is_interactive = std::io::stdin().is_terminal();
    let approval = ralph_config::policy_bridge::build_approval_config(
        config,
        is_interactive,
        &workspace_root.iter().cloned().collect::<Vec<_>>(),
    );

    let registry = DefaultToolRegistry::new();
    let client = build_client(config)?;

    let binary_path = std::env::current_exe().context("resolving own executable path for subagent spawning")?;
    let agent_id = uuid::Uuid::new_v4().simple().to_string();
    let subagents = SubagentManager::new(binary_path, config.subagents.max_concurrent, agent_id);

    let transcript_path = config.sessions.transcript_dir.as_ref().map(|dir| {
        let _ = std::fs::create_dir_all(dir);
        PathBuf::from(dir).join(format!("{}.jsonl", uuid::Uuid::new_v4().simple()))
    });
    let system_prompt = system_prompt_text(config);
    let mut store = JsonlConversationStore::new(
        Some(&system_prompt),
        config.runtime.context_window_tokens,
        config.runtime.response_reserve_tokens,
        transcript_path,
    );

    let sink: Box<dyn OutputSink> = match cli.format.as_str() {
        "json" => Box::new(sink::JsonSink),
        _ => Box::new(sink::TerminalSink),
    };

    println!("ralph — interactive agent. Ctrl-D to exit.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tool_ctx = ToolExecCtx { is_subagent: false };
        let reason = session::run_turn(
            line,
            &mut store,
            &client,
            sink.as_ref(),
            &approval,
            &registry,
            Some(&subagents),
            tool_ctx,
        );
        match reason {
            EndReason::UserAbort => println!("(turn aborted)"),
            EndReason::SafetyLimit => println!("(safety limit reached — ending turn)"),
            EndReason::ApiError => println!("(the model request failed; see the log above)"),
            EndReason::NoMoreTools | EndReason::UserInterrupt | EndReason::ContextFull => {}
        }
    }

    subagents.shutdown();
    Ok(())
}
