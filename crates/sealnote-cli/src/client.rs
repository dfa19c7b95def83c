//! HTTP client for the sealnoted application API

use anyhow::{Context, Result};
use reqwest::{header, Response, StatusCode};
use sealnote_core::config::ClientConfig;
use sealnote_core::{AppendEvent, NotesEvent, WrappedKey};
use serde::Deserialize;

const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    cookie_name: String,
    cookie: String,
    csrf: Option<String>,
}

impl ApiClient {
    pub fn from_config(client: &ClientConfig, cookie_name: &str) -> Result<Self> {
        let cookie = client
            .session_cookie
            .clone()
            .context("no session cookie; set client.session_cookie or SEALNOTE_COOKIE")?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("sealnote/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base: client.server_url.trim_end_matches('/').to_string(),
            cookie_name: cookie_name.to_string(),
            cookie,
            csrf: client.csrf_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.cookie)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .header(header::COOKIE, self.cookie_header())
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        let csrf = self
            .csrf
            .as_deref()
            .context("no CSRF token; set client.csrf_token or SEALNOTE_CSRF")?;
        Ok(self
            .http
            .post(self.url(path))
            .header(header::COOKIE, self.cookie_header())
            .header(CSRF_HEADER, csrf))
    }

    /// The stored wrapped key, or `None` before `init`.
    pub async fn get_key(&self) -> Result<Option<WrappedKey>> {
        let resp = self.get("/api/key").send().await.context("GET /api/key")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        Ok(Some(resp.json().await.context("decoding wrapped key")?))
    }

    pub async fn create_key(&self, key: &WrappedKey) -> Result<()> {
        let resp = self
            .post("/api/key")?
            .json(key)
            .send()
            .await
            .context("POST /api/key")?;
        if resp.status() == StatusCode::CONFLICT {
            anyhow::bail!("this account already has a key; use `sealnote unlock`");
        }
        check(resp).await?;
        Ok(())
    }

    pub async fn history(&self) -> Result<Vec<NotesEvent>> {
        let resp = self
            .get("/api/history")
            .send()
            .await
            .context("GET /api/history")?;
        let resp = check(resp).await?;
        resp.json().await.context("decoding history")
    }

    pub async fn append(&self, event: &AppendEvent) -> Result<NotesEvent> {
        let resp = self
            .post("/api/history")?
            .json(event)
            .send()
            .await
            .context("POST /api/history")?;
        let resp = check(resp).await?;
        resp.json().await.context("decoding appended event")
    }

    /// Open the push stream. The response body is `text/event-stream`.
    pub async fn open_stream(&self) -> Result<Response> {
        let resp = self
            .get("/api/stream")
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .context("GET /api/stream")?;
        check(resp).await
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: ErrorBody = resp.json().await.unwrap_or_default();
    Err(describe(status, &body))
}

fn describe(status: StatusCode, body: &ErrorBody) -> anyhow::Error {
    match (status, body.error.as_str()) {
        (StatusCode::UNAUTHORIZED, _) => {
            anyhow::anyhow!("session rejected (401); the cookie is missing, expired or revoked")
        }
        (StatusCode::FORBIDDEN, "csrf") => anyhow::anyhow!("CSRF token rejected (403)"),
        (StatusCode::BAD_REQUEST, "invalid_event") => anyhow::anyhow!(
            "server rejected event: {}",
            body.reason.as_deref().unwrap_or("unknown")
        ),
        (_, "") => anyhow::anyhow!("server returned {status}"),
        (_, error) => anyhow::anyhow!("server returned {status}: {error}"),
    }
}
