//! Error handling for the node
//!
//! Every fallible operation in the crate returns [`Result`]. Failures are
//! recovered close to where they occur: a rejected transaction or block
//! never corrupts local state, and a failed peer session aborts only that
//! peer's connection.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Transaction validation failures, in the order the validator checks them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Missing or malformed transaction fields
    InvalidStructure(String),
    /// Sender cannot cover amount + fee
    InsufficientBalance { required: u64, available: u64 },
    /// Signature does not verify against the transaction payload
    InvalidSignature,
}

/// Failures in key generation, signing, and verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    KeyGenFailure(String),
    SignFailure(String),
    VerifyFailure(String),
}

/// Failures in the symmetric session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    EncryptionFailure(String),
    DecryptionFailure(String),
    /// No session key stored for the peer
    SessionNotFound(String),
}

/// Block and chain validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Index or previous-hash linkage broken between adjacent blocks
    LinkMismatch(String),
    /// Recomputed block hash differs from the stored one
    HashMismatch(String),
    /// Block exceeds the configured size limit
    SizeExceeded { size: u32, max: u32 },
    /// Genesis block fails its dedicated checks
    GenesisInvalid(String),
}

/// Transaction pool failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    DuplicateTransaction(String),
    PoolEmpty,
}

/// Peer synchronization failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    PeerUnreachable(String),
    ReconciliationFailure(String),
}

/// Top-level error type for all node operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Validation(ValidationError),
    Crypto(CryptoError),
    Cipher(CipherError),
    Chain(ChainError),
    Pool(PoolError),
    Sync(SyncError),
    /// Opaque failure surfaced from the record-store collaborator
    Storage(String),
    /// Configuration loading or parsing errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File and socket I/O errors
    Io(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidStructure(msg) => write!(f, "invalid structure: {msg}"),
            ValidationError::InsufficientBalance {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient balance: required {required}, available {available}"
                )
            }
            ValidationError::InvalidSignature => write!(f, "invalid signature"),
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyGenFailure(msg) => write!(f, "key generation failed: {msg}"),
            CryptoError::SignFailure(msg) => write!(f, "signing failed: {msg}"),
            CryptoError::VerifyFailure(msg) => write!(f, "verification failed: {msg}"),
        }
    }
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherError::EncryptionFailure(msg) => write!(f, "encryption failed: {msg}"),
            CipherError::DecryptionFailure(msg) => write!(f, "decryption failed: {msg}"),
            CipherError::SessionNotFound(peer) => {
                write!(f, "no session key stored for peer {peer}")
            }
        }
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::LinkMismatch(msg) => write!(f, "chain link mismatch: {msg}"),
            ChainError::HashMismatch(msg) => write!(f, "block hash mismatch: {msg}"),
            ChainError::SizeExceeded { size, max } => {
                write!(f, "block size {size} exceeds limit {max}")
            }
            ChainError::GenesisInvalid(msg) => write!(f, "invalid genesis block: {msg}"),
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::DuplicateTransaction(id) => {
                write!(f, "transaction {id} already pooled")
            }
            PoolError::PoolEmpty => write!(f, "transaction pool is empty"),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::PeerUnreachable(peer) => write!(f, "peer unreachable: {peer}"),
            SyncError::ReconciliationFailure(msg) => {
                write!(f, "reconciliation failed: {msg}")
            }
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Validation(e) => write!(f, "validation error: {e}"),
            NodeError::Crypto(e) => write!(f, "cryptographic error: {e}"),
            NodeError::Cipher(e) => write!(f, "cipher error: {e}"),
            NodeError::Chain(e) => write!(f, "chain error: {e}"),
            NodeError::Pool(e) => write!(f, "pool error: {e}"),
            NodeError::Sync(e) => write!(f, "sync error: {e}"),
            NodeError::Storage(msg) => write!(f, "storage error: {msg}"),
            NodeError::Config(msg) => write!(f, "configuration error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<ValidationError> for NodeError {
    fn from(err: ValidationError) -> Self {
        NodeError::Validation(err)
    }
}

impl From<CryptoError> for NodeError {
    fn from(err: CryptoError) -> Self {
        NodeError::Crypto(err)
    }
}

impl From<CipherError> for NodeError {
    fn from(err: CipherError) -> Self {
        NodeError::Cipher(err)
    }
}

impl From<ChainError> for NodeError {
    fn from(err: ChainError) -> Self {
        NodeError::Chain(err)
    }
}

impl From<PoolError> for NodeError {
    fn from(err: PoolError) -> Self {
        NodeError::Pool(err)
    }
}

impl From<SyncError> for NodeError {
    fn from(err: SyncError) -> Self {
        NodeError::Sync(err)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<sled::Error> for NodeError {
    fn from(err: sled::Error) -> Self {
        NodeError::Storage(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for NodeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for NodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}
