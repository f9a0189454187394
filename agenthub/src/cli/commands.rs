//! CLI command execution.
//!
//! Every command except `serve` and `kb` is a thin client over the backend.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use agenthub::api::ApiClient;
use agenthub::chat::{ChatOutcome, ChatService};
use agenthub::config::Config;
use agenthub::models::Session;
use agenthub::server;
use agenthub::session::SessionManager;
use agenthub::state::AppState;
use agenthub::stream::StreamRelay;

use super::args::{Cli, Commands, KbAction, SessionAction};
use super::render::{write_line, LogPrinter};

/// Knowledge base and session name used by `kb ask`.
const LOCAL_KB: &str = "local";

/// How often the chat command redraws the streaming reply.
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a command needs, built once from config.
struct App {
    config: Config,
    state: Arc<AppState>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let api = Arc::new(ApiClient::new(&config).context("Failed to build HTTP client")?);
        tracing::debug!(base_url = api.base_url(), "backend client ready");
        let state = Arc::new(AppState::new(SessionManager::new(api.clone()), api));
        Ok(Self { config, state })
    }

    fn chat_service(&self) -> Result<ChatService> {
        let relay = StreamRelay::new(&self.config).context("Failed to build HTTP client")?;
        Ok(ChatService::new(
            self.state.clone(),
            relay,
            self.config.retrieval_latency(),
        ))
    }
}

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())
        .context("Failed to load config")?
        .with_base_url(cli.base_url);
    tracing::debug!(base_url = %config.base_url, "config loaded");

    match cli.command {
        Commands::Serve { port, delay_ms } => {
            server::start_server(port, Duration::from_millis(delay_ms)).await
        }
        Commands::Agents { name } => list_agents(&App::new(config)?, name.as_deref()).await,
        Commands::Sessions { action } => sessions(&App::new(config)?, action).await,
        Commands::History { session_id } => history(&App::new(config)?, &session_id).await,
        Commands::Chat {
            agent,
            session,
            message,
        } => {
            let app = App::new(config)?;
            chat(&app, &agent, session.as_deref(), &message.join(" ")).await
        }
        Commands::Kb {
            action: KbAction::Ask { files, query },
        } => kb_ask(&App::new(config)?, &files, &query.join(" ")).await,
    }
}

async fn list_agents(ctx: &App, name: Option<&str>) -> Result<()> {
    let agents = ctx.state.refresh_agents(name).await;
    if agents.is_empty() {
        println!("No agents found.");
        return Ok(());
    }

    println!("{:<18} {:<24} {:<16} {}", "ID", "NAME", "MODEL", "DESCRIPTION");
    println!("{}", "-".repeat(80));
    for agent in agents {
        println!(
            "{:<18} {:<24} {:<16} {}",
            truncate(&agent.id, 16),
            truncate(&agent.name, 22),
            agent.model.as_deref().unwrap_or("-"),
            agent.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

async fn sessions(ctx: &App, action: SessionAction) -> Result<()> {
    let sessions = &ctx.state.sessions;
    match action {
        SessionAction::List { agent, archived } => {
            let listed = if archived {
                sessions.list_archived(&agent).await
            } else {
                sessions.list_sessions(&agent).await
            };
            print_sessions(&listed);
        }
        SessionAction::New { agent } => {
            let session = sessions
                .create_session(&agent)
                .await
                .context("Failed to create session")?;
            println!("Created session {}", session.id);
        }
        SessionAction::Rename { id, title } => {
            let title = title.join(" ");
            sessions
                .rename_session(&id, &title)
                .await
                .context("Failed to rename session")?;
            println!("Renamed {id} to {title:?}");
        }
        SessionAction::Archive { id } => {
            sessions
                .set_archived(&id, true)
                .await
                .context("Failed to archive session")?;
            println!("Archived {id}");
        }
        SessionAction::Unarchive { id } => {
            sessions
                .set_archived(&id, false)
                .await
                .context("Failed to unarchive session")?;
            println!("Restored {id}");
        }
        SessionAction::Delete { id } => {
            ctx.state
                .delete_session(&id)
                .await
                .context("Failed to delete session")?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("No sessions found.");
        return;
    }

    println!("{:<38} {:<30} {:<20}", "ID", "TITLE", "UPDATED");
    println!("{}", "-".repeat(88));
    for session in sessions {
        println!(
            "{:<38} {:<30} {:<20}",
            session.id,
            truncate(&session.title, 28),
            session.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

async fn history(ctx: &App, session_id: &str) -> Result<()> {
    let messages = ctx.state.load_history(session_id).await;
    if messages.is_empty() {
        println!("No messages found for session {session_id}.");
        return Ok(());
    }

    let mut out = io::stdout().lock();
    for message in &messages {
        write_line(message, &mut out)?;
    }
    Ok(())
}

async fn chat(ctx: &App, agent: &str, session: Option<&str>, message: &str) -> Result<()> {
    let sessions = &ctx.state.sessions;
    if let Some(session_id) = session {
        sessions.list_sessions(agent).await;
        sessions
            .select(agent, session_id)
            .await
            .with_context(|| format!("Session {session_id} is not an active session of {agent}"))?;
    }
    let active = sessions
        .ensure_active(agent)
        .await
        .context("Failed to open a session")?;
    let start = ctx.state.messages(&active.id).await.len();

    let service = ctx.chat_service()?;
    let cancel = CancellationToken::new();
    let mut send = {
        let (agent, message, cancel) = (agent.to_string(), message.to_string(), cancel.clone());
        tokio::spawn(async move { service.send(&agent, &message, &cancel).await })
    };

    let mut printer = LogPrinter::starting_at(start);
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let outcome = loop {
        tokio::select! {
            joined = &mut send => break joined.context("Chat task panicked")?,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
            _ = redraw.tick() => {
                let messages = ctx.state.messages(&active.id).await;
                printer.render(&messages, &mut io::stdout().lock())?;
            }
        }
    };

    let messages = ctx.state.messages(&active.id).await;
    let mut out = io::stdout().lock();
    printer.render(&messages, &mut out)?;
    printer.finish(&mut out)?;

    match outcome.context("Chat failed")? {
        ChatOutcome::Completed => Ok(()),
        ChatOutcome::Aborted => {
            eprintln!("(reply stopped)");
            Ok(())
        }
        ChatOutcome::Failed(reason) => bail!("Reply interrupted: {reason}"),
    }
}

async fn kb_ask(ctx: &App, files: &[PathBuf], query: &str) -> Result<()> {
    for path in files {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let chunks = ctx
            .state
            .add_document(LOCAL_KB, &name, &text, ctx.config.chunk_max_chars)
            .await;
        tracing::info!(document = %name, chunks, "document indexed");
    }

    let kb = ctx
        .state
        .knowledge_base(LOCAL_KB)
        .await
        .unwrap_or_default();
    let answer = ctx
        .chat_service()?
        .ask_knowledge_base(LOCAL_KB, &kb, query)
        .await;
    println!("{answer}");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
