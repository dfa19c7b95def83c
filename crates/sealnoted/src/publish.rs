//! Client side of `/internal/publish`, for when the broker runs in another
//! process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sealnote_core::SocketFrame;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::BROKER_SECRET_HEADER;

/// Largest serialized event the broker will fan out.
pub const MAX_EVENT_BYTES: usize = 2048;

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    pub username: String,
    pub event: Value,
}

/// Why a published event was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventRejected {
    #[error("event must be a JSON object")]
    NotAnObject,
    #[error("event needs a non-empty string `type`")]
    MissingType,
    #[error("event exceeds {MAX_EVENT_BYTES} bytes")]
    TooLarge,
}

/// Accept any small JSON object carrying a string `type`.
pub fn check_event(event: &Value) -> Result<(), EventRejected> {
    let Some(obj) = event.as_object() else {
        return Err(EventRejected::NotAnObject);
    };
    match obj.get("type").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => {}
        _ => return Err(EventRejected::MissingType),
    }
    if event.to_string().len() > MAX_EVENT_BYTES {
        return Err(EventRejected::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub ok: bool,
    pub delivered: usize,
}

#[derive(Clone)]
pub struct RemoteBroker {
    client: reqwest::Client,
    endpoint: String,
    secret: Arc<SecretString>,
}

impl RemoteBroker {
    pub fn new(base_url: &str, secret: Arc<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("building broker HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/internal/publish", base_url.trim_end_matches('/')),
            secret,
        })
    }

    /// POST one event for `username`; returns how many sockets it reached.
    pub async fn publish(&self, username: &str, event: Value) -> Result<usize> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(BROKER_SECRET_HEADER, self.secret.expose_secret())
            .json(&PublishRequest {
                username: username.to_string(),
                event,
            })
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?
            .error_for_status()
            .context("broker rejected publish")?;
        let body: PublishResponse = resp.json().await.context("decoding publish response")?;
        Ok(body.delivered)
    }

    /// Fire-and-forget variant used after appends; failures are only logged.
    pub fn publish_detached(&self, username: &str, frame: SocketFrame) {
        let this = self.clone();
        let username = username.to_string();
        tokio::spawn(async move {
            match this.publish(&username, frame.to_value()).await {
                Ok(delivered) => {
                    tracing::debug!(user = %username, delivered, "remote broker notified")
                }
                Err(e) => tracing::warn!(user = %username, error = %e, "remote broker publish failed"),
            }
        });
    }
}
