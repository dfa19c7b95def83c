//! sealnote: end-to-end encrypted notes client
//!
//! Commands:
//!   init                 - create the account key (prompts for a new passphrase)
//!   unlock               - check that the passphrase opens the stored key
//!   list                 - decrypt and print the current notes
//!   add <title>          - create a note
//!   edit <id>            - change a note's title or body
//!   pin / unpin <id>     - toggle the pinned flag
//!   delete <id>          - delete a note
//!   undo / redo          - step back or forward through history
//!   watch                - follow the push stream and print changes
//!   config show          - display current configuration
//!
//! Note ids may be abbreviated to any unique prefix.

mod client;
mod sse;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use sealnote_core::config::SealConfig;
use sealnote_core::{NoteSnapshot, ReconstructedState};
use sealnote_sync::NotesSession;

use client::ApiClient;
use sse::SseDecoder;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealnote",
    version,
    about = "End-to-end encrypted notes",
    long_about = "sealnote: read and edit notes whose content never leaves this machine unencrypted"
)]
struct Cli {
    /// Path to sealnote.toml configuration file
    #[arg(long, short = 'c', env = "SEALNOTE_CONFIG", default_value = "sealnote.toml")]
    config: PathBuf,

    /// Server base URL (overrides client.server_url)
    #[arg(long, env = "SEALNOTE_SERVER")]
    server: Option<String>,

    /// Signed session cookie value (overrides client.session_cookie)
    #[arg(long, env = "SEALNOTE_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// CSRF token (overrides client.csrf_token)
    #[arg(long, env = "SEALNOTE_CSRF", hide_env_values = true)]
    csrf: Option<String>,

    /// Log filter, e.g. "warn" or "sealnote=debug"
    #[arg(long, env = "SEALNOTE_LOG", default_value = "warn")]
    log: String,

    /// Log output format
    #[arg(long, env = "SEALNOTE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and upload the account key
    ///
    /// The passphrase is read from SEALNOTE_PASSPHRASE or prompted for twice.
    Init,

    /// Verify the passphrase against the stored key
    Unlock,

    /// Print the current notes
    List {
        /// Include note bodies
        #[arg(long, short = 'b')]
        bodies: bool,
    },

    /// Create a note
    Add {
        title: String,
        #[arg(long, short = 'b', default_value = "")]
        body: String,
    },

    /// Change a note's title and/or body
    Edit {
        id: String,
        #[arg(long, short = 't')]
        title: Option<String>,
        #[arg(long, short = 'b')]
        body: Option<String>,
    },

    /// Pin a note
    Pin { id: String },

    /// Unpin a note
    Unpin { id: String },

    /// Delete a note
    Delete { id: String },

    /// Undo the most recent action
    Undo,

    /// Redo the most recently undone action
    Redo,

    /// Follow the push stream, reconnecting with backoff
    Watch {
        /// Decrypt and print the notes after every change
        #[arg(long)]
        show: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.log_format);

    let mut config = sealnote_core::config::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(server) = cli.server {
        config.client.server_url = server;
    }
    if cli.cookie.is_some() {
        config.client.session_cookie = cli.cookie;
    }
    if cli.csrf.is_some() {
        config.client.csrf_token = cli.csrf;
    }

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        return cmd_config_show(&config, &cli.config);
    }

    let api = ApiClient::from_config(&config.client, &config.server.cookie_name)?;
    match cli.command {
        Commands::Init => cmd_init(&api).await,
        Commands::Unlock => cmd_unlock(&api).await,
        Commands::List { bodies } => cmd_list(&api, bodies).await,
        Commands::Add { title, body } => cmd_add(&api, &title, &body).await,
        Commands::Edit { id, title, body } => cmd_edit(&api, &id, title, body).await,
        Commands::Pin { id } => cmd_set_pinned(&api, &id, true).await,
        Commands::Unpin { id } => cmd_set_pinned(&api, &id, false).await,
        Commands::Delete { id } => cmd_delete(&api, &id).await,
        Commands::Undo => cmd_undo(&api).await,
        Commands::Redo => cmd_redo(&api).await,
        Commands::Watch { show } => cmd_watch(&api, show).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Passphrase + session ──────────────────────────────────────────────────────

fn read_passphrase(prompt: &str) -> Result<SecretString> {
    if let Ok(p) = std::env::var("SEALNOTE_PASSPHRASE") {
        return Ok(SecretString::from(p));
    }
    let p = rpassword::prompt_password(prompt).context("reading passphrase")?;
    Ok(SecretString::from(p))
}

async fn open_session(api: &ApiClient) -> Result<NotesSession> {
    let wrapped = api
        .get_key()
        .await?
        .context("no key stored for this account; run `sealnote init` first")?;
    let passphrase = read_passphrase("Passphrase: ")?;
    NotesSession::unlock(&passphrase, &wrapped).context("wrong passphrase or corrupt key")
}

async fn load_state(api: &ApiClient, session: &NotesSession) -> Result<ReconstructedState> {
    let events = api.history().await?;
    Ok(session.reconstruct(events))
}

/// Resolve a full note id or unique prefix against the current state.
fn find_note<'a>(state: &'a ReconstructedState, id: &str) -> Result<&'a NoteSnapshot> {
    if let Some(exact) = state.notes.iter().find(|n| n.id == id) {
        return Ok(exact);
    }
    let mut matches = state.notes.iter().filter(|n| n.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(note), None) => Ok(note),
        (Some(_), Some(_)) => anyhow::bail!("note id prefix '{id}' is ambiguous"),
        (None, _) => anyhow::bail!("no note matching '{id}'"),
    }
}

// ── `sealnote init` / `unlock` ────────────────────────────────────────────────

async fn cmd_init(api: &ApiClient) -> Result<()> {
    if api.get_key().await?.is_some() {
        anyhow::bail!("this account already has a key; use `sealnote unlock`");
    }

    let passphrase = read_passphrase("New passphrase: ")?;
    if std::env::var_os("SEALNOTE_PASSPHRASE").is_none() {
        let again = read_passphrase("Repeat passphrase: ")?;
        if passphrase.expose_secret() != again.expose_secret() {
            anyhow::bail!("passphrases do not match");
        }
    }

    let (_session, wrapped) =
        NotesSession::initialize(&passphrase).context("generating account key")?;
    api.create_key(&wrapped).await?;
    println!("key created; notes are now encrypted with your passphrase");
    Ok(())
}

async fn cmd_unlock(api: &ApiClient) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    println!("unlocked: {} note(s)", state.notes.len());
    Ok(())
}

// ── `sealnote list` ───────────────────────────────────────────────────────────

async fn cmd_list(api: &ApiClient, bodies: bool) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    print_state(&state, bodies);
    Ok(())
}

fn print_state(state: &ReconstructedState, bodies: bool) {
    if state.notes.is_empty() {
        println!("(no notes)");
    }
    let (pinned, rest): (Vec<_>, Vec<_>) = state.notes.iter().partition(|n| n.pinned);
    for note in pinned.into_iter().chain(rest) {
        println!("{}", note_line(note));
        if bodies && !note.body.is_empty() {
            for line in note.body.lines() {
                println!("    {line}");
            }
        }
    }
    let mut flags = Vec::new();
    if state.can_undo {
        flags.push("undo");
    }
    if state.can_redo {
        flags.push("redo");
    }
    if !flags.is_empty() {
        println!("\navailable: {}", flags.join(", "));
    }
}

fn note_line(note: &NoteSnapshot) -> String {
    let short: String = note.id.chars().take(8).collect();
    let marker = if note.pinned { '*' } else { ' ' };
    format!(
        "{marker} {short}  {}  {}",
        note.created_at.format("%Y-%m-%d %H:%M"),
        note.title
    )
}

// ── `sealnote add` / `edit` / `pin` / `delete` ────────────────────────────────

async fn cmd_add(api: &ApiClient, title: &str, body: &str) -> Result<()> {
    let session = open_session(api).await?;
    let (note, event) = session.create_note(title, body).context("encrypting note")?;
    api.append(&event).await?;
    println!("created {}", note.id);
    Ok(())
}

async fn cmd_edit(
    api: &ApiClient,
    id: &str,
    title: Option<String>,
    body: Option<String>,
) -> Result<()> {
    if title.is_none() && body.is_none() {
        anyhow::bail!("nothing to change; pass --title and/or --body");
    }
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    let mut note = find_note(&state, id)?.clone();
    if let Some(title) = title {
        note.title = title;
    }
    if let Some(body) = body {
        note.body = body;
    }
    let event = session.update_note(&note).context("encrypting note")?;
    api.append(&event).await?;
    println!("updated {}", note.id);
    Ok(())
}

async fn cmd_set_pinned(api: &ApiClient, id: &str, pinned: bool) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    let mut note = find_note(&state, id)?.clone();
    if note.pinned == pinned {
        println!("{} is already {}", note.id, if pinned { "pinned" } else { "unpinned" });
        return Ok(());
    }
    note.pinned = pinned;
    let event = session.update_note(&note).context("encrypting note")?;
    api.append(&event).await?;
    println!("{} {}", if pinned { "pinned" } else { "unpinned" }, note.id);
    Ok(())
}

async fn cmd_delete(api: &ApiClient, id: &str) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    let note_id = find_note(&state, id)?.id.clone();
    api.append(&session.delete_note(&note_id)).await?;
    println!("deleted {note_id}");
    Ok(())
}

// ── `sealnote undo` / `redo` ──────────────────────────────────────────────────

async fn cmd_undo(api: &ApiClient) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    let Some(event) = session.undo(&state) else {
        println!("nothing to undo");
        return Ok(());
    };
    api.append(&event).await?;
    println!("undid change to {}", event.note_id);
    Ok(())
}

async fn cmd_redo(api: &ApiClient) -> Result<()> {
    let session = open_session(api).await?;
    let state = load_state(api, &session).await?;
    let Some(event) = session.redo(&state) else {
        println!("nothing to redo");
        return Ok(());
    };
    api.append(&event).await?;
    println!("redid change to {}", event.note_id);
    Ok(())
}

// ── `sealnote watch` ──────────────────────────────────────────────────────────

const BACKOFF_MIN: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Reconnect delay: doubles per failure up to a cap, back to the floor once a
/// connection is established.
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self { next: BACKOFF_MIN }
    }

    fn fail(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = BACKOFF_MIN;
    }
}

async fn cmd_watch(api: &ApiClient, show: bool) -> Result<()> {
    let session = if show { Some(open_session(api).await?) } else { None };
    let mut backoff = Backoff::new();

    loop {
        let outcome = tokio::select! {
            r = watch_once(api, session.as_ref(), &mut backoff) => r,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        match outcome {
            Ok(()) => tracing::info!("push stream closed by server"),
            Err(e) => tracing::warn!("push stream error: {e:#}"),
        }

        let delay = backoff.fail();
        eprintln!("disconnected; reconnecting in {:.1}s", delay.as_secs_f32());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn watch_once(
    api: &ApiClient,
    session: Option<&NotesSession>,
    backoff: &mut Backoff,
) -> Result<()> {
    let resp = api.open_stream().await?;
    backoff.reset();

    let mut decoder = SseDecoder::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("reading push stream")?;
        for event in decoder.push(&chunk) {
            match event.event.as_str() {
                "hello" => eprintln!("connected; watching for changes"),
                "notes:changed" => {
                    let head = serde_json::from_str::<serde_json::Value>(&event.data)
                        .ok()
                        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from))
                        .unwrap_or_default();
                    println!("notes changed (head {head})");
                    if let Some(session) = session {
                        let state = load_state(api, session).await?;
                        print_state(&state, false);
                    }
                }
                "ping" => tracing::trace!("ping"),
                other => tracing::debug!(event = other, "ignoring unknown push event"),
            }
        }
    }
    Ok(())
}

// ── `sealnote config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let mut shown = config.clone();
    if shown.client.session_cookie.is_some() {
        shown.client.session_cookie = Some("<redacted>".into());
    }
    if shown.server.cookie_secret.is_some() {
        shown.server.cookie_secret = Some("<redacted>".into());
    }
    if shown.notify.broker_secret.is_some() {
        shown.notify.broker_secret = Some("<redacted>".into());
    }
    let rendered = toml::to_string_pretty(&shown).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
