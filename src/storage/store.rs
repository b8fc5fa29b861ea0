use crate::core::{Block, Transaction};
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity families the node persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Block,
    Transaction,
    Peer,
    Identity,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Block => "blocks",
            EntityKind::Transaction => "transactions",
            EntityKind::Peer => "peers",
            EntityKind::Identity => "identity",
        }
    }
}

/// A persisted record: typed id plus an opaque serialized body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: EntityKind,
    pub body: Vec<u8>,
}

/// Key-value record store collaborator. The core never talks to a
/// database directly; implementations are injected at the composition
/// root.
pub trait RecordStore: Send + Sync {
    fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>>;
    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;
    /// Insert a new record. Returns `false` when the id already exists.
    fn add(&self, record: Record) -> Result<bool>;
    /// Overwrite an existing record. Returns `false` when the id is absent.
    fn update(&self, id: &str, record: Record) -> Result<bool>;
    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool>;
}

/// Block persistence shape: header fields flat, transactions embedded as
/// a JSON blob string.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBlock {
    id: Uuid,
    index: u64,
    timestamp: i64,
    transactions_json: String,
    merkle_root: String,
    previous_hash: String,
    hash: String,
    difficulty: u32,
    nonce: String,
    signature: Vec<u8>,
}

pub fn block_record(block: &Block) -> Result<Record> {
    let stored = StoredBlock {
        id: block.id(),
        index: block.index(),
        timestamp: block.timestamp(),
        transactions_json: serde_json::to_string(block.transactions())?,
        merkle_root: block.merkle_root().to_string(),
        previous_hash: block.previous_hash().to_string(),
        hash: block.hash().to_string(),
        difficulty: block.difficulty(),
        nonce: block.nonce().to_string(),
        signature: block.signature().to_vec(),
    };
    Ok(Record {
        id: block.id().to_string(),
        kind: EntityKind::Block,
        body: serialize(&stored)?,
    })
}

pub fn block_from_record(record: &Record) -> Result<Block> {
    if record.kind != EntityKind::Block {
        return Err(NodeError::Storage(format!(
            "expected a block record, got {:?}",
            record.kind
        )));
    }
    let stored: StoredBlock = deserialize(&record.body)?;
    let transactions: Vec<Transaction> = serde_json::from_str(&stored.transactions_json)?;
    Block::from_parts(
        stored.id,
        stored.index,
        stored.timestamp,
        transactions,
        stored.merkle_root,
        stored.previous_hash,
        stored.hash,
        stored.difficulty,
        stored.nonce,
        stored.signature,
    )
}

pub fn transaction_record(tx: &Transaction) -> Result<Record> {
    Ok(Record {
        id: tx.id().to_string(),
        kind: EntityKind::Transaction,
        body: serialize(tx)?,
    })
}

pub fn transaction_from_record(record: &Record) -> Result<Transaction> {
    if record.kind != EntityKind::Transaction {
        return Err(NodeError::Storage(format!(
            "expected a transaction record, got {:?}",
            record.kind
        )));
    }
    deserialize(&record.body)
}

/// Load every stored block, sorted into chain order.
pub fn load_chain(store: &dyn RecordStore) -> Result<Vec<Block>> {
    let mut blocks = store
        .get_all(EntityKind::Block)?
        .iter()
        .map(block_from_record)
        .collect::<Result<Vec<Block>>>()?;
    blocks.sort_by_key(|b| b.index());
    Ok(blocks)
}

pub fn save_block(store: &dyn RecordStore, block: &Block) -> Result<()> {
    if !store.add(block_record(block)?)? {
        return Err(NodeError::Storage(format!(
            "block {} already persisted",
            block.id()
        )));
    }
    Ok(())
}
