//! Key derivation: PBKDF2-HMAC-SHA256 passphrase → key-encryption key

use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// Production iteration count. Not stored alongside the wrapped key, so it
/// must never change for existing records.
pub const KDF_ITERATIONS: u32 = 250_000;

/// A 256-bit key-encryption key derived from a passphrase.
///
/// Only used to wrap/unwrap the DEK. Zeroized on drop.
pub struct Kek {
    bytes: [u8; KEY_SIZE],
}

impl Kek {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Kek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("bytes", &"[REDACTED]").finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 250000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: KDF_ITERATIONS,
        }
    }
}

/// Derive a 256-bit KEK from a passphrase and a 16-byte salt.
pub fn derive_kek(passphrase: &SecretString, salt: &[u8; SALT_SIZE], params: &KdfParams) -> Kek {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut bytes,
    );
    Kek { bytes }
}
