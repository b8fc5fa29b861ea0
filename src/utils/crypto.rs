use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING,
};

use crate::error::{CryptoError, NodeError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NodeError::Crypto(CryptoError::KeyGenFailure(format!("system time: {e}"))))?
        .as_millis();

    if duration > i64::MAX as u128 {
        return Err(NodeError::Crypto(CryptoError::KeyGenFailure(
            "timestamp overflow".to_string(),
        )));
    }

    Ok(duration as i64)
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 digest rendered as lowercase hex. Block hashes and merkle roots
/// use this form so the proof-of-work rule can count leading `'0'`
/// characters directly.
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(sha256_digest(data).as_slice())
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| NodeError::Crypto(CryptoError::VerifyFailure(format!("invalid base58: {e}"))))
}

/// Generate a fresh ECDSA P-256 key pair as a PKCS#8 document.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| {
            NodeError::Crypto(CryptoError::KeyGenFailure(format!(
                "ECDSA key pair generation: {e}"
            )))
        })?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

/// Extract the uncompressed public key from a PKCS#8 document.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| {
            NodeError::Crypto(CryptoError::KeyGenFailure(format!("malformed PKCS#8: {e}")))
        })?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

pub fn ecdsa_sign(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| {
            NodeError::Crypto(CryptoError::SignFailure(format!("malformed PKCS#8: {e}")))
        })?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| NodeError::Crypto(CryptoError::SignFailure(e.to_string())))?
        .as_ref()
        .to_vec();
    Ok(signature)
}

/// Verify an ECDSA P-256 signature. Returns `false` on any mismatch,
/// including malformed keys or signatures; it never errors.
pub fn ecdsa_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key =
        ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    peer_public_key.verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();
        let message = b"settle height 42";

        let signature = ecdsa_sign(&pkcs8, message).unwrap();
        assert!(ecdsa_verify(&public_key, &signature, message));
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();

        let signature = ecdsa_sign(&pkcs8, b"original").unwrap();
        assert!(!ecdsa_verify(&public_key, &signature, b"tampered"));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let pkcs8 = new_key_pair().unwrap();
        let other = new_key_pair().unwrap();
        let other_public = public_key_from_pkcs8(&other).unwrap();

        let signature = ecdsa_sign(&pkcs8, b"message").unwrap();
        // Must return false, never panic or error
        assert!(!ecdsa_verify(&other_public, &signature, b"message"));
    }

    #[test]
    fn test_verify_garbage_key_material() {
        assert!(!ecdsa_verify(b"not a key", b"not a signature", b"message"));
    }

    #[test]
    fn test_sha256_hex_shape() {
        let hex = sha256_hex(b"abc");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_base58_round_trip() {
        let data = vec![0, 0, 1, 2, 3, 255];
        let encoded = base58_encode(&data);
        // Leading zero bytes map to '1'
        assert!(encoded.starts_with("11"));
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }
}
