//! Data-encryption key lifecycle: generate, wrap under the KEK, unwrap, import

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use sealnote_core::WrappedKey;
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::kdf::{derive_kek, KdfParams};
use crate::{b64_decode, b64_encode, random_bytes, KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Raw DEK bytes, as returned by key creation and unwrapping. Zeroized on drop.
pub struct DekBytes {
    bytes: [u8; KEY_SIZE],
}

impl DekBytes {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DekBytes {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DekBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DekBytes")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An imported DEK that can encrypt and decrypt but never hands its bytes
/// back out. Zeroized on drop.
pub struct DekHandle {
    key: [u8; KEY_SIZE],
}

impl DekHandle {
    pub(crate) fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&self.key).into())
    }
}

impl Drop for DekHandle {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for DekHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DekHandle").finish_non_exhaustive()
    }
}

/// Generate a random 256-bit data-encryption key.
pub fn generate_dek() -> DekBytes {
    DekBytes::from_bytes(random_bytes::<KEY_SIZE>())
}

/// Turn raw DEK bytes into an encrypt/decrypt-only handle.
pub fn import_dek(dek: DekBytes) -> DekHandle {
    DekHandle {
        key: *dek.as_bytes(),
    }
}

/// Create a fresh DEK and wrap it under a KEK derived from `passphrase`.
///
/// Returns the server-storable record plus the raw DEK for immediate use.
pub fn create_wrapped_dek(passphrase: &SecretString) -> Result<(WrappedKey, DekBytes), CryptoError> {
    create_wrapped_dek_with_params(passphrase, &KdfParams::default())
}

/// [`create_wrapped_dek`] with explicit KDF parameters.
pub fn create_wrapped_dek_with_params(
    passphrase: &SecretString,
    params: &KdfParams,
) -> Result<(WrappedKey, DekBytes), CryptoError> {
    let salt = random_bytes::<SALT_SIZE>();
    let dek = generate_dek();
    let kek = derive_kek(passphrase, &salt, params);

    let nonce_bytes = random_bytes::<NONCE_SIZE>();
    let cipher = ChaCha20Poly1305::new(kek.as_bytes().into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), dek.as_bytes().as_ref())
        .map_err(|_| CryptoError::Encrypt)?;

    tracing::debug!(iterations = params.iterations, "data key wrapped");

    let wrapped = WrappedKey {
        kdf_salt: b64_encode(&salt),
        wrapped_key_iv: b64_encode(&nonce_bytes),
        wrapped_key_ciphertext: b64_encode(&ciphertext),
    };
    Ok((wrapped, dek))
}

/// Re-derive the KEK from the stored salt and decrypt the DEK.
pub fn unwrap_dek(passphrase: &SecretString, wrapped: &WrappedKey) -> Result<DekBytes, CryptoError> {
    unwrap_dek_with_params(passphrase, wrapped, &KdfParams::default())
}

/// [`unwrap_dek`] with explicit KDF parameters.
pub fn unwrap_dek_with_params(
    passphrase: &SecretString,
    wrapped: &WrappedKey,
    params: &KdfParams,
) -> Result<DekBytes, CryptoError> {
    let parts = WrappedParts::decode(wrapped);

    // Derive even for malformed records so both failure paths cost the same.
    let salt = parts.as_ref().map(|p| p.salt).unwrap_or([0u8; SALT_SIZE]);
    let kek = derive_kek(passphrase, &salt, params);

    let parts = parts.ok_or(CryptoError::UnlockFailed)?;
    let cipher = ChaCha20Poly1305::new(kek.as_bytes().into());
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(&parts.nonce), parts.ciphertext.as_ref())
        .map_err(|_| CryptoError::UnlockFailed)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(CryptoError::UnlockFailed);
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(DekBytes::from_bytes(bytes))
}

struct WrappedParts {
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl WrappedParts {
    fn decode(wrapped: &WrappedKey) -> Option<Self> {
        let salt = b64_decode(&wrapped.kdf_salt)?.try_into().ok()?;
        let nonce = b64_decode(&wrapped.wrapped_key_iv)?.try_into().ok()?;
        let ciphertext = b64_decode(&wrapped.wrapped_key_ciphertext)?;
        if ciphertext.len() != KEY_SIZE + TAG_SIZE {
            return None;
        }
        Some(Self {
            salt,
            nonce,
            ciphertext,
        })
    }
}
