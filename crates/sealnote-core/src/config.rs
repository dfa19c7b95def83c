use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealError, SealResult};

/// Top-level configuration (loaded from sealnote.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address for the application API (default: 127.0.0.1:8080)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Name of the signed session cookie
    pub cookie_name: String,
    /// HMAC secret for session cookies. A random one is generated when unset,
    /// which invalidates every cookie on restart.
    pub cookie_secret: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend: "memory", "fs" or "s3"
    pub backend: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Object key prefix inside the backend
    pub prefix: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Push-stream poll interval in milliseconds (default: 1500)
    pub push_interval_ms: u64,
    /// Socket session-revocation sweep interval in seconds (default: 30)
    pub sweep_interval_secs: u64,
    /// Capacity of the in-process change feed
    pub feed_capacity: usize,
    /// Separate listen address for the socket broker. When unset the broker
    /// routes are served on the main listener.
    pub broker_listen: Option<String>,
    /// Shared secret for POST /internal/publish
    pub broker_secret: Option<String>,
    /// Publish URL of a remote broker process (e.g. http://broker:8081)
    pub broker_url: Option<String>,
}

/// Settings for the `sealnote` CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the sealnoted API
    pub server_url: String,
    /// Signed session cookie value (s:<sid>.<mac>)
    pub session_cookie: Option<String>,
    /// CSRF token issued with the session
    pub csrf_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            cookie_name: "sealnote_session".into(),
            cookie_secret: None,
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            root: PathBuf::from("~/.local/share/sealnote"),
            prefix: "sealnote".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "sealnote".into(),
            enforce_tls: false,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_interval_ms: 1500,
            sweep_interval_secs: 30,
            feed_capacity: 256,
            broker_listen: None,
            broker_secret: None,
            broker_url: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            session_cookie: None,
            csrf_token: None,
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file is
/// missing.
pub fn load(path: &Path) -> SealResult<SealConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found (using defaults)");
        return Ok(SealConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| SealError::Config(format!("parsing {}: {e}", path.display())))
}

/// Expand `~` in a path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
