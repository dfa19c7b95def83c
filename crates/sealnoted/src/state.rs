use std::sync::Arc;
use std::time::Duration;

use sealnote_store::NotesLog;
use sealnote_sync::{Broker, ChangeFeed, CookieSigner, SessionStore};
use secrecy::SecretString;

use crate::metrics::Metrics;
use crate::publish::RemoteBroker;

/// Everything a request handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<dyn NotesLog>,
    pub sessions: Arc<dyn SessionStore>,
    pub signer: CookieSigner,
    pub cookie_name: String,
    pub feed: ChangeFeed,
    pub broker: Arc<Broker>,
    pub metrics: Arc<Metrics>,
    pub push_interval: Duration,
    /// Secret expected on `/internal/publish`. Unset rejects every publish.
    pub broker_secret: Option<Arc<SecretString>>,
    /// Out-of-process broker to notify after appends, if any.
    pub remote_broker: Option<RemoteBroker>,
}
