//! sealnote-sync: turning the encrypted log into notes, and telling sessions
//! when to look again
//!
//! - [`replay`]: pure reconstruction of notes and the undo/redo cursor
//! - [`session`]: [`NotesSession`], the explicit key context on the client
//! - [`feed`], [`push`], [`broker`]: the change-notification building blocks
//! - [`session_store`]: session lookup and signed session cookies

pub mod broker;
pub mod feed;
pub mod push;
pub mod replay;
pub mod session;
pub mod session_store;

pub use broker::{Broker, BrokerCounts, ConnectionId, Outbound};
pub use feed::{ChangeFeed, LogChanged};
pub use push::{PushEvent, PushTicker};
pub use replay::{apply_notes_events, decrypt_events};
pub use session::NotesSession;
pub use session_store::{
    random_token, CookieSigner, InvalidSecret, MemorySessionStore, Session, SessionStore,
};
