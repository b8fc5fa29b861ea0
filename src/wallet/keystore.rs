//! Encrypted persistence for the node identity.
//!
//! The PKCS#8 document is sealed with AES-256-GCM under an Argon2id key
//! derived from a passphrase. Salt and nonce are stored alongside the
//! ciphertext; the wallet address stays in the clear for lookup.

use crate::error::{CipherError, NodeError, Result};
use crate::network::{SecureChannel, SessionKey};
use crate::storage::{EntityKind, Record};
use crate::utils::{current_timestamp, deserialize, serialize};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SALT_LEN: usize = 32;
const DERIVED_KEY_LEN: usize = 32;

/// Fixed record id of the single self-identity record
pub const IDENTITY_RECORD_ID: &str = "self";

/// Sealed identity record, safe to persist through the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedIdentity {
    pub node_id: Uuid,
    pub address: String,
    pub salt: Vec<u8>,
    /// Nonce-prefixed AES-256-GCM ciphertext of the PKCS#8 document
    pub ciphertext: Vec<u8>,
    pub created_at: i64,
}

/// Seal a wallet under a passphrase.
pub fn seal_identity(
    node_id: Uuid,
    wallet: &Wallet,
    passphrase: &str,
) -> Result<EncryptedIdentity> {
    let salt = random_salt();
    let key = derive_key(passphrase, &salt)?;
    let channel = SecureChannel::new(&key)?;
    let ciphertext = channel.encrypt(wallet.pkcs8())?;

    Ok(EncryptedIdentity {
        node_id,
        address: wallet.address(),
        salt,
        ciphertext,
        created_at: current_timestamp()?,
    })
}

/// Open a sealed identity. A wrong passphrase fails the GCM tag check and
/// surfaces as `DecryptionFailure`.
pub fn open_identity(sealed: &EncryptedIdentity, passphrase: &str) -> Result<Wallet> {
    let key = derive_key(passphrase, &sealed.salt)?;
    let channel = SecureChannel::new(&key)?;
    let pkcs8 = channel.decrypt(&sealed.ciphertext)?;
    Wallet::from_pkcs8(pkcs8)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<SessionKey> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(65536, 3, 1, Some(DERIVED_KEY_LEN)).map_err(|e| {
        NodeError::Cipher(CipherError::EncryptionFailure(format!(
            "invalid Argon2 parameters: {e}"
        )))
    })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = vec![0u8; DERIVED_KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| {
            NodeError::Cipher(CipherError::EncryptionFailure(format!(
                "key derivation: {e}"
            )))
        })?;
    SessionKey::normalized(key)
}

pub fn identity_record(identity: &EncryptedIdentity) -> Result<Record> {
    Ok(Record {
        id: IDENTITY_RECORD_ID.to_string(),
        kind: EntityKind::Identity,
        body: serialize(identity)?,
    })
}

pub fn identity_from_record(record: &Record) -> Result<EncryptedIdentity> {
    if record.kind != EntityKind::Identity {
        return Err(NodeError::Storage(format!(
            "expected an identity record, got {:?}",
            record.kind
        )));
    }
    deserialize(&record.body)
}

fn random_salt() -> Vec<u8> {
    use rand::RngCore;
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let wallet = Wallet::new().unwrap();
        let node_id = Uuid::new_v4();
        let sealed = seal_identity(node_id, &wallet, "correct horse battery").unwrap();

        assert_eq!(sealed.address, wallet.address());

        let opened = open_identity(&sealed, "correct horse battery").unwrap();
        assert_eq!(opened.address(), wallet.address());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let wallet = Wallet::new().unwrap();
        let sealed = seal_identity(Uuid::new_v4(), &wallet, "right").unwrap();

        let result = open_identity(&sealed, "wrong");
        assert!(matches!(
            result,
            Err(NodeError::Cipher(CipherError::DecryptionFailure(_)))
        ));
    }

    #[test]
    fn test_salt_varies_between_seals() {
        let wallet = Wallet::new().unwrap();
        let a = seal_identity(Uuid::new_v4(), &wallet, "pass").unwrap();
        let b = seal_identity(Uuid::new_v4(), &wallet, "pass").unwrap();
        assert_ne!(a.salt, b.salt);
    }
}
