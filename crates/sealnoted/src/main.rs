//! sealnoted: end-to-end encrypted notes server
//!
//! Usage:
//!   sealnoted [--config sealnote.toml] [--mode all|app|broker]
//!
//! Modes:
//!   all     - notes API, push stream and socket broker in one process [default]
//!   app     - notes API and push stream; publishes to notify.broker_url
//!   broker  - socket broker only (/ws, /internal/publish, /health)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use sealnoted::daemon::{self, Role, SeedSession};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sealnoted", version, about = "End-to-end encrypted notes server")]
struct Cli {
    /// Path to sealnote.toml configuration file
    #[arg(long, short = 'c', env = "SEALNOTE_CONFIG", default_value = "sealnote.toml")]
    config: PathBuf,

    /// Which surfaces to serve
    #[arg(long, default_value = "all")]
    mode: Mode,

    /// Log level (trace, debug, info, warn, error); overrides server.log_level
    #[arg(long, env = "SEALNOTE_LOG")]
    log: Option<String>,

    /// Log format; overrides server.log_format
    #[arg(long, env = "SEALNOTE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Dev only: pre-create a session, as user:sid:csrf (repeatable)
    #[arg(long = "seed-session", value_name = "USER:SID:CSRF")]
    seed_sessions: Vec<SeedSession>,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum Mode {
    All,
    App,
    Broker,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = sealnote_core::config::load(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.server.log_level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.server.log_format.as_str() {
        "text" => LogFormat::Text,
        _ => LogFormat::Json,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?cli.mode,
        config = %cli.config.display(),
        "sealnoted starting"
    );

    let role = match cli.mode {
        Mode::All => Role::All,
        Mode::App => Role::App,
        Mode::Broker => Role::Broker,
    };
    daemon::run(config, role, cli.seed_sessions).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
