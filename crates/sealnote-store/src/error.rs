use sealnote_core::EventKind;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Why an append (or key record) was rejected before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("note_id is required")]
    MissingNoteId,

    #[error("{0} events require payload_iv and payload_ciphertext")]
    MissingPayload(EventKind),

    #[error("{0} events must not carry a payload")]
    UnexpectedPayload(EventKind),

    #[error("{0} events require target_event_id")]
    MissingTarget(EventKind),

    #[error("{0} events must not carry target_event_id")]
    UnexpectedTarget(EventKind),

    #[error("payload is not base64 or has the wrong nonce length")]
    MalformedPayload,

    #[error("wrapped key record is incomplete or not base64")]
    MalformedKey,
}

impl ShapeError {
    /// Stable machine-readable reason, returned to clients verbatim.
    pub fn reason(&self) -> &'static str {
        match self {
            ShapeError::MissingNoteId => "missing_note_id",
            ShapeError::MissingPayload(_) => "missing_payload",
            ShapeError::UnexpectedPayload(_) => "unexpected_payload",
            ShapeError::MissingTarget(_) => "missing_target",
            ShapeError::UnexpectedTarget(_) => "unexpected_target",
            ShapeError::MalformedPayload => "malformed_payload",
            ShapeError::MalformedKey => "malformed_key",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid event: {0}")]
    Shape(#[from] ShapeError),

    #[error("wrapped key already exists")]
    KeyExists,

    #[error("invalid username: {0:?}")]
    InvalidUser(String),

    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}
