//! Authenticated JSON payload encryption under the DEK
//!
//! Wire format: two base64 strings, `payload_iv` (12-byte random nonce) and
//! `payload_ciphertext` (ChaCha20-Poly1305 ciphertext with the 16-byte tag
//! appended). The plaintext is the UTF-8 JSON serialization of the value.

use chacha20poly1305::{aead::Aead, Nonce};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::DekHandle;
use crate::{b64_decode, b64_encode, random_bytes, NONCE_SIZE, TAG_SIZE};

/// An encrypted JSON value, ready to attach to an event or session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub payload_iv: String,
    pub payload_ciphertext: String,
}

/// Serialize `value` to JSON and encrypt it under a fresh random nonce.
pub fn encrypt_json<T: Serialize + ?Sized>(
    key: &DekHandle,
    value: &T,
) -> Result<EncryptedPayload, CryptoError> {
    let mut plaintext =
        serde_json::to_vec(value).map_err(|e| CryptoError::Encode(e.to_string()))?;

    let nonce_bytes = random_bytes::<NONCE_SIZE>();
    let result = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref());
    plaintext.zeroize();
    let ciphertext = result.map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedPayload {
        payload_iv: b64_encode(&nonce_bytes),
        payload_ciphertext: b64_encode(&ciphertext),
    })
}

/// Decrypt and deserialize a payload produced by [`encrypt_json`].
///
/// Fails with [`CryptoError::Decrypt`] on malformed encodings and on any
/// authentication failure; never returns unauthenticated plaintext.
pub fn decrypt_json<T: DeserializeOwned>(
    key: &DekHandle,
    payload_iv: &str,
    payload_ciphertext: &str,
) -> Result<T, CryptoError> {
    let nonce: [u8; NONCE_SIZE] = b64_decode(payload_iv)
        .and_then(|v| v.try_into().ok())
        .ok_or(CryptoError::Decrypt)?;
    let ciphertext = b64_decode(payload_ciphertext).ok_or(CryptoError::Decrypt)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decrypt);
    }

    let mut plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| CryptoError::Decrypt)?;

    let value = serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Encode(e.to_string()));
    plaintext.zeroize();
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_dek, import_dek};
    use serde_json::json;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = import_dek(generate_dek());
        let value = json!({"title": "groceries", "body": "eggs, milk", "n": 3});

        let enc = encrypt_json(&key, &value).unwrap();
        let dec: serde_json::Value =
            decrypt_json(&key, &enc.payload_iv, &enc.payload_ciphertext).unwrap();

        assert_eq!(dec, value);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = import_dek(generate_dek());
        let a = encrypt_json(&key, "same").unwrap();
        let b = encrypt_json(&key, "same").unwrap();
        assert_ne!(a.payload_iv, b.payload_iv);
        assert_ne!(a.payload_ciphertext, b.payload_ciphertext);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let k1 = import_dek(generate_dek());
        let k2 = import_dek(generate_dek());
        let enc = encrypt_json(&k1, &json!({"secret": true})).unwrap();

        let result: Result<serde_json::Value, _> =
            decrypt_json(&k2, &enc.payload_iv, &enc.payload_ciphertext);
        assert_eq!(result.unwrap_err(), CryptoError::Decrypt);
    }

    #[test]
    fn test_decrypt_tampered_ciphertext() {
        let key = import_dek(generate_dek());
        let enc = encrypt_json(&key, &json!("hello")).unwrap();

        let mut raw = b64_decode(&enc.payload_ciphertext).unwrap();
        raw[0] ^= 0xFF;
        let tampered = b64_encode(&raw);

        let result: Result<String, _> = decrypt_json(&key, &enc.payload_iv, &tampered);
        assert_eq!(result.unwrap_err(), CryptoError::Decrypt);
    }

    #[test]
    fn test_decrypt_rejects_bad_encodings() {
        let key = import_dek(generate_dek());
        let enc = encrypt_json(&key, &json!(1)).unwrap();

        let bad_iv: Result<i32, _> = decrypt_json(&key, "%%%", &enc.payload_ciphertext);
        assert_eq!(bad_iv.unwrap_err(), CryptoError::Decrypt);

        let short_iv: Result<i32, _> =
            decrypt_json(&key, &b64_encode(&[1u8; 8]), &enc.payload_ciphertext);
        assert_eq!(short_iv.unwrap_err(), CryptoError::Decrypt);

        let short_ct: Result<i32, _> = decrypt_json(&key, &enc.payload_iv, &b64_encode(&[1u8; 4]));
        assert_eq!(short_ct.unwrap_err(), CryptoError::Decrypt);
    }

    #[test]
    fn test_wrong_target_type_is_encode_error() {
        let key = import_dek(generate_dek());
        let enc = encrypt_json(&key, &json!({"a": 1})).unwrap();
        let result: Result<Vec<u8>, _> =
            decrypt_json(&key, &enc.payload_iv, &enc.payload_ciphertext);
        assert!(matches!(result, Err(CryptoError::Encode(_))));
    }
}
