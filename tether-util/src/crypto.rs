use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::types::SymmetricKey;

type HmacSha256 = Hmac<Sha256>;

/// Largest binary key accepted when decoding a base64 key.
///
/// Group and device keys issued by the broker are 32 or 64 bytes. Anything
/// longer is rejected instead of being cut down to size.
pub const KEY_CAPACITY: usize = 64;

/// Largest base64 text produced when encoding a MAC.
pub const ENCODED_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("key is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("decoded key is {len} bytes, at most {capacity} are supported")]
    KeyTooLong { len: usize, capacity: usize },

    #[error("encoded output is {len} bytes, at most {capacity} are supported")]
    Encode { len: usize, capacity: usize },

    #[error("key rejected by HMAC")]
    InvalidKey,
}

/// Decode a base64 key into its binary form, enforcing [`KEY_CAPACITY`].
pub fn decode_key(key_b64: &str) -> Result<Vec<u8>, CryptoError> {
    let key = STANDARD.decode(key_b64.trim())?;
    if key.len() > KEY_CAPACITY {
        return Err(CryptoError::KeyTooLong {
            len: key.len(),
            capacity: KEY_CAPACITY,
        });
    }
    Ok(key)
}

/// Compute HMAC-SHA256 of `message` with a binary `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(message);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Base64 encode `bytes`, failing if the result would not fit [`ENCODED_CAPACITY`].
pub fn encode(bytes: &[u8]) -> Result<String, CryptoError> {
    let encoded = STANDARD.encode(bytes);
    if encoded.len() > ENCODED_CAPACITY {
        return Err(CryptoError::Encode {
            len: encoded.len(),
            capacity: ENCODED_CAPACITY,
        });
    }
    Ok(encoded)
}

/// Sign `message` with a base64 encoded key, returning the base64 signature.
pub fn sign(key: &SymmetricKey, message: &str) -> Result<String, CryptoError> {
    let key = decode_key(key.expose())?;
    let mac = hmac_sha256(&key, message.as_bytes())?;
    encode(&mac)
}

/// Derive the individual device key for `registration_id` from an
/// enrollment group key.
///
/// The broker computes the same value on its side, so the derivation must
/// stay HMAC-SHA256(group key, registration id), base64 encoded.
pub fn derive_device_key(
    group_key: &SymmetricKey,
    registration_id: &str,
) -> Result<SymmetricKey, CryptoError> {
    sign(group_key, registration_id).map(SymmetricKey::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 32 zero bytes
    const ZERO_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn it_derives_the_same_key_for_the_same_inputs() {
        let group_key = SymmetricKey::from(ZERO_KEY);

        let first = derive_device_key(&group_key, "device-01").unwrap();
        let second = derive_device_key(&group_key, "device-01").unwrap();

        assert_eq!(first, second);
        // 32 byte MAC, base64 encoded with padding
        assert_eq!(first.expose().len(), 44);
    }

    #[test]
    fn it_derives_different_keys_for_different_devices() {
        let group_key = SymmetricKey::from(ZERO_KEY);

        let first = derive_device_key(&group_key, "device-01").unwrap();
        let second = derive_device_key(&group_key, "device-02").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn it_matches_the_rfc4231_hmac_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        let expected = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(mac, expected);

        let group_key = SymmetricKey::from(STANDARD.encode(b"Jefe"));
        let derived = derive_device_key(&group_key, "what do ya want for nothing?").unwrap();
        assert_eq!(derived.expose(), STANDARD.encode(expected));
    }

    #[test]
    fn it_rejects_malformed_base64() {
        let group_key = SymmetricKey::from("not base64!!");
        let result = derive_device_key(&group_key, "device-01");

        assert!(matches!(result, Err(CryptoError::Decode(_))));
    }

    #[test]
    fn it_rejects_keys_over_capacity() {
        let group_key = SymmetricKey::from(STANDARD.encode([7u8; KEY_CAPACITY + 1]));
        let result = derive_device_key(&group_key, "device-01");

        assert_eq!(
            result,
            Err(CryptoError::KeyTooLong {
                len: KEY_CAPACITY + 1,
                capacity: KEY_CAPACITY
            })
        );
    }

    #[test]
    fn it_accepts_keys_at_capacity() {
        let group_key = SymmetricKey::from(STANDARD.encode([7u8; KEY_CAPACITY]));
        assert!(derive_device_key(&group_key, "device-01").is_ok());
    }

    #[test]
    fn it_refuses_to_encode_past_capacity() {
        let result = encode(&[1u8; 64]);
        assert_eq!(
            result,
            Err(CryptoError::Encode {
                len: 88,
                capacity: ENCODED_CAPACITY
            })
        );
    }
}
