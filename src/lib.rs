//! # peerledger
//!
//! A peer-to-peer blockchain node: cryptographically linked blocks,
//! fee-prioritized transaction pooling, proof-of-work block assembly, and
//! chain synchronization over a session-encrypted wire protocol.
//!
//! ## Layout
//! - `core/`: transactions, pool, merkle root, blocks, the builder, the
//!   in-memory chain, and the validators
//! - `network/`: wire envelopes, peer registry, session layer, the sync
//!   engine, and the TCP server
//! - `storage/`: record-store abstraction with sled and in-memory backends
//! - `wallet/`: signing identity, address derivation, encrypted keystore
//! - `config/`, `cli/`, `error/`, `utils/`: settings, command surface,
//!   error taxonomy, crypto and serialization helpers

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::Settings;
pub use core::{
    Block, BlockBuilder, Blockchain, BuilderConfig, BuilderState, ChainValidation, ChainValidator,
    MerkleTree, Transaction, TransactionPool, TransactionStatus, TransactionValidator,
    ValidatorConfig, GENESIS_INDEX, GENESIS_PREVIOUS_HASH,
};
pub use error::{
    ChainError, CipherError, CryptoError, NodeError, PoolError, Result, SyncError, ValidationError,
};
pub use network::{
    submit_transaction, ChainSummary, Envelope, InMemorySessionStore, MessagePayload, Method, Peer,
    PeerRegistry, PeerStatus, SecureChannel, Server, SessionKey, SessionKeyStore, SyncConfig,
    SyncEngine,
};
pub use storage::{load_chain, save_block, EntityKind, MemoryStore, Record, RecordStore, SledStore};
pub use wallet::{derive_address, open_identity, seal_identity, validate_address, Wallet};
