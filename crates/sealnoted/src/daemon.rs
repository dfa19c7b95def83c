//! Server lifecycle: build the store and notifier, spawn background tasks,
//! serve until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use sealnote_core::config::SealConfig;
use sealnote_store::{build_operator, MemoryLog, NotesLog, ObjectLog, S3Credentials};
use sealnote_sync::{random_token, Broker, ChangeFeed, CookieSigner, MemorySessionStore, Session, SessionStore};
use secrecy::SecretString;
use tracing::{error, info, warn};

use crate::metrics::{HealthState, Metrics};
use crate::publish::RemoteBroker;
use crate::state::AppState;

/// Which surfaces this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Notes API + push stream; notifies a remote broker if one is configured.
    App,
    /// Sockets + publish + health only.
    Broker,
    /// Both, sharing one change feed.
    All,
}

/// A dev-only session seeded from `user:sid:csrf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSession {
    pub username: String,
    pub session_id: String,
    pub csrf_token: String,
}

impl std::str::FromStr for SeedSession {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(u), Some(sid), Some(csrf)) if !u.is_empty() && !sid.is_empty() && !csrf.is_empty() => {
                Ok(SeedSession {
                    username: u.to_string(),
                    session_id: sid.to_string(),
                    csrf_token: csrf.to_string(),
                })
            }
            _ => Err(format!("expected user:sid:csrf, got {s:?}")),
        }
    }
}

/// Seeded sessions stay valid for this long.
const SEED_TTL_DAYS: i64 = 30;

pub async fn build_log(config: &SealConfig) -> Result<Arc<dyn NotesLog>> {
    let store = &config.store;
    if store.backend == "memory" {
        warn!("memory store: notes are lost on restart");
        return Ok(Arc::new(MemoryLog::new()));
    }

    let creds = if store.backend == "s3" {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("SEALNOTE_ACCESS_KEY_ID"))
            .context("S3 credentials not set: export AWS_ACCESS_KEY_ID")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("SEALNOTE_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY not set")?;
        Some(S3Credentials {
            access_key_id,
            secret_access_key,
        })
    } else {
        None
    };

    let op = build_operator(store, creds.as_ref()).context("building store operator")?;
    let log = ObjectLog::new(op, store.prefix.clone());
    match log.check_health().await {
        Ok(()) => info!(backend = %store.backend, "store: connected"),
        Err(e) => warn!(backend = %store.backend, "store: {e} (serving anyway, /readyz will report it)"),
    }
    Ok(Arc::new(log))
}

pub async fn build_state(config: &SealConfig, log: Arc<dyn NotesLog>, seeds: &[SeedSession]) -> Result<AppState> {
    let cookie_secret = match &config.server.cookie_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("server.cookie_secret unset: generated one, sessions end on restart");
            random_token()
        }
    };
    let signer = CookieSigner::new(cookie_secret).context("server.cookie_secret")?;

    let sessions = Arc::new(MemorySessionStore::new());
    for seed in seeds {
        sessions
            .insert(Session {
                id: seed.session_id.clone(),
                username: seed.username.clone(),
                csrf_token: seed.csrf_token.clone(),
                expires_at: Utc::now() + chrono::Duration::days(SEED_TTL_DAYS),
                revoked: false,
            })
            .await;
        info!(
            user = %seed.username,
            cookie = %format!("{}={}", config.server.cookie_name, signer.sign(&seed.session_id)),
            "seeded dev session"
        );
    }

    let broker_secret = config
        .notify
        .broker_secret
        .clone()
        .map(|s| Arc::new(SecretString::from(s)));

    let remote_broker = match (&config.notify.broker_url, &broker_secret) {
        (Some(url), Some(secret)) => Some(RemoteBroker::new(url, secret.clone())?),
        (Some(_), None) => {
            warn!("notify.broker_url set without notify.broker_secret; remote publish disabled");
            None
        }
        _ => None,
    };

    Ok(AppState {
        log,
        sessions,
        signer,
        cookie_name: config.server.cookie_name.clone(),
        feed: ChangeFeed::new(config.notify.feed_capacity),
        broker: Arc::new(Broker::new()),
        metrics: Arc::new(Metrics::new()),
        push_interval: Duration::from_millis(config.notify.push_interval_ms.max(1)),
        broker_secret,
        remote_broker,
    })
}

pub async fn run(config: SealConfig, role: Role, seeds: Vec<SeedSession>) -> Result<()> {
    info!(?role, "server starting");

    let log = build_log(&config).await?;
    let state = build_state(&config, log, &seeds).await?;

    if let Some(addr) = config.server.metrics_addr.clone() {
        let health = HealthState {
            metrics: state.metrics.clone(),
            log: state.log.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, health).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    // ── Broker background tasks ──────────────────────────────────────────
    let serves_broker = role != Role::App;
    let mut background = Vec::new();
    if serves_broker {
        let sweep_every = Duration::from_secs(config.notify.sweep_interval_secs.max(1));
        background.push(
            state
                .broker
                .clone()
                .spawn_sweeper(state.sessions.clone(), sweep_every),
        );
        let metrics = state.metrics.clone();
        background.push(
            state
                .broker
                .clone()
                .spawn_feed_forwarder(&state.feed, move |n| metrics.fanned_out(n)),
        );
    }

    // ── Listeners ────────────────────────────────────────────────────────
    let app = crate::app_router(state.clone());
    let broker = crate::broker_router(state.clone());

    let main_router = match (role, &config.notify.broker_listen) {
        (Role::App, _) => app,
        (Role::Broker, _) => broker,
        (Role::All, Some(addr)) => {
            let addr = addr.clone();
            tokio::spawn(async move {
                if let Err(e) = serve(&addr, broker, "broker").await {
                    error!("broker listener failed: {e}");
                }
            });
            app
        }
        (Role::All, None) => app.merge(broker),
    };

    let result = serve(&config.server.listen, main_router, "api").await;

    for task in background {
        task.abort();
    }
    info!("server stopped");
    result
}

async fn serve(addr: &str, router: Router, name: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {name} listen address {addr:?}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("{name} bind {addr}"))?;
    info!(%addr, "{name}: listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("ctrl-c handler failed: {e}");
            }
        })
        .await
        .with_context(|| format!("{name} server"))
}
