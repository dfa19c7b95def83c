//! sealnote-crypto: client-side E2E encryption for SealNote
//!
//! Key hierarchy:
//! ```text
//! Passphrase + 16-byte salt
//!   └── KEK (256-bit, PBKDF2-HMAC-SHA256, 250k iterations)
//!         └── wraps DEK (256-bit random, ChaCha20-Poly1305, random 96-bit nonce)
//!               └── encrypts JSON payloads (note snapshots, session metadata)
//! ```
//!
//! The server only ever stores the salt, the wrap nonce and the wrapped DEK
//! (see [`sealnote_core::WrappedKey`]). The passphrase, KEK and DEK stay in
//! client memory and are zeroized on drop.

pub mod error;
pub mod kdf;
pub mod keys;
pub mod payload;

pub use error::CryptoError;
pub use kdf::{derive_kek, KdfParams, Kek, KDF_ITERATIONS};
pub use keys::{
    create_wrapped_dek, create_wrapped_dek_with_params, generate_dek, import_dek, unwrap_dek,
    unwrap_dek_with_params, DekBytes, DekHandle,
};
pub use payload::{decrypt_json, encrypt_json, EncryptedPayload};

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a ChaCha20-Poly1305 nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the PBKDF2 salt
pub const SALT_SIZE: usize = 16;

pub(crate) fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

pub(crate) fn b64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.decode(s).ok()
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
