use thiserror::Error;

/// Failures surfaced by the key wrapper and payload cipher.
///
/// Every unwrap failure maps to [`CryptoError::UnlockFailed`]; a malformed
/// record and a wrong passphrase are indistinguishable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("unlock failed")]
    UnlockFailed,

    #[error("payload decryption failed")]
    Decrypt,

    #[error("payload encryption failed")]
    Encrypt,

    #[error("payload encoding failed: {0}")]
    Encode(String),
}
