//! Per-peer session keys and the authenticated channel they drive.
//!
//! Key establishment is an X25519 exchange: each side sends its ephemeral
//! public key and both derive the same 32-byte secret. Derived material
//! longer than the cipher key length is truncated, not stretched through
//! a KDF; that is the documented behavior this layer preserves. Message
//! encryption is AES-256-GCM with a random nonce prefixed to the
//! ciphertext.

use crate::error::{CipherError, NodeError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;
use zeroize::ZeroizeOnDrop;

pub const SESSION_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Symmetric session key, zeroed on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionKey {
    key: Vec<u8>,
}

impl SessionKey {
    /// Normalize raw key material to the cipher key length: oversized
    /// keys are truncated to 32 bytes, undersized ones are refused.
    pub fn normalized(mut key: Vec<u8>) -> Result<SessionKey> {
        if key.len() < SESSION_KEY_LEN {
            return Err(NodeError::Cipher(CipherError::EncryptionFailure(format!(
                "session key shorter than {SESSION_KEY_LEN} bytes"
            ))));
        }
        key.truncate(SESSION_KEY_LEN);
        Ok(SessionKey { key })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("length", &self.key.len())
            .finish()
    }
}

/// One side of an in-flight key exchange. `begin` mints the ephemeral
/// pair to advertise; `complete` consumes it against the peer's public
/// key and yields the shared session key.
pub struct Handshake {
    private_key: EphemeralPrivateKey,
    public_key: Vec<u8>,
}

impl Handshake {
    pub fn begin() -> Result<Handshake> {
        let rng = SystemRandom::new();
        let private_key = EphemeralPrivateKey::generate(&X25519, &rng).map_err(|e| {
            NodeError::Cipher(CipherError::EncryptionFailure(format!(
                "handshake key generation: {e}"
            )))
        })?;
        let public_key = private_key
            .compute_public_key()
            .map_err(|e| {
                NodeError::Cipher(CipherError::EncryptionFailure(format!(
                    "handshake public key: {e}"
                )))
            })?
            .as_ref()
            .to_vec();
        Ok(Handshake {
            private_key,
            public_key,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn complete(self, peer_public_key: &[u8]) -> Result<SessionKey> {
        let peer = UnparsedPublicKey::new(&X25519, peer_public_key);
        let shared = agree_ephemeral(self.private_key, &peer, |material| material.to_vec())
            .map_err(|e| {
                NodeError::Cipher(CipherError::EncryptionFailure(format!(
                    "key agreement: {e}"
                )))
            })?;
        SessionKey::normalized(shared)
    }
}

/// Ephemeral store of per-peer session keys, an external-cache
/// collaborator in a full deployment.
pub trait SessionKeyStore: Send + Sync {
    fn set(&self, peer_id: Uuid, key: SessionKey, ttl: Option<Duration>) -> Result<()>;
    fn get(&self, peer_id: &Uuid) -> Result<Option<SessionKey>>;
}

struct StoredKey {
    key: SessionKey,
    expires_at: Option<Instant>,
}

/// In-process session store with TTL expiry.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<HashMap<Uuid, StoredKey>>,
}

impl InMemorySessionStore {
    pub fn new() -> InMemorySessionStore {
        InMemorySessionStore::default()
    }
}

impl SessionKeyStore for InMemorySessionStore {
    fn set(&self, peer_id: Uuid, key: SessionKey, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NodeError::Storage("session store lock poisoned".to_string()))?;
        inner.insert(
            peer_id,
            StoredKey {
                key,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    fn get(&self, peer_id: &Uuid) -> Result<Option<SessionKey>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NodeError::Storage("session store lock poisoned".to_string()))?;
        match inner.get(peer_id) {
            Some(stored) => {
                if let Some(expires_at) = stored.expires_at {
                    if Instant::now() >= expires_at {
                        inner.remove(peer_id);
                        return Ok(None);
                    }
                }
                Ok(Some(stored.key.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Fetch a peer's session key or fail with `SessionNotFound`.
pub fn require_session(store: &dyn SessionKeyStore, peer_id: &Uuid) -> Result<SessionKey> {
    store.get(peer_id)?.ok_or_else(|| {
        NodeError::Cipher(CipherError::SessionNotFound(peer_id.to_string()))
    })
}

/// AES-256-GCM channel bound to one session key.
pub struct SecureChannel {
    cipher: Aes256Gcm,
}

impl SecureChannel {
    pub fn new(key: &SessionKey) -> Result<SecureChannel> {
        if key.as_bytes().len() != SESSION_KEY_LEN {
            return Err(NodeError::Cipher(CipherError::EncryptionFailure(format!(
                "AES-256-GCM requires a {SESSION_KEY_LEN}-byte key"
            ))));
        }
        let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Ok(SecureChannel {
            cipher: Aes256Gcm::new(aes_key),
        })
    }

    /// Encrypt with a fresh random nonce; output is nonce ‖ ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = random_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|e| {
            NodeError::Cipher(CipherError::EncryptionFailure(format!("AES-256-GCM: {e}")))
        })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a nonce-prefixed message. Fails closed: any truncation,
    /// tampering, or wrong key surfaces as `DecryptionFailure`.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() <= NONCE_LEN {
            return Err(NodeError::Cipher(CipherError::DecryptionFailure(
                "message shorter than the nonce prefix".to_string(),
            )));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, ciphertext).map_err(|e| {
            NodeError::Cipher(CipherError::DecryptionFailure(format!("AES-256-GCM: {e}")))
        })
    }
}

fn random_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
