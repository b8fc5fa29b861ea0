use crate::core::Transaction;
use crate::error::Result;
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Previous-hash sentinel of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Index the builder assigns to the genesis block (1-based chain)
pub const GENESIS_INDEX: u64 = 1;

/// Fixed byte cost accounted for the block header fields
pub const BLOCK_HEADER_BYTES: u32 = 256;

/// An ordered batch of transactions with metadata linking it to its
/// predecessor. Immutable once appended to the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    id: Uuid,
    index: u64,
    timestamp: i64,
    transactions: Vec<Transaction>,
    merkle_root: String,
    previous_hash: String,
    hash: String,
    difficulty: u32,
    nonce: String,
    signature: Vec<u8>,
    size_bytes: u32,
}

impl Block {
    /// Assemble a finalized block from mined parts. Callers (the builder,
    /// and tests) are responsible for having satisfied the proof-of-work
    /// condition on `hash`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        merkle_root: String,
        previous_hash: String,
        hash: String,
        difficulty: u32,
        nonce: String,
        signature: Vec<u8>,
    ) -> Result<Block> {
        let size_bytes = Self::accounted_size(&transactions)?;
        Ok(Block {
            id,
            index,
            timestamp,
            transactions,
            merkle_root,
            previous_hash,
            hash,
            difficulty,
            nonce,
            signature,
            size_bytes,
        })
    }

    /// Header hash over `index ‖ timestamp ‖ previous_hash ‖ merkle_root`.
    ///
    /// The nonce and the transaction list are intentionally NOT part of
    /// the preimage; mining varies the timestamp (and regenerates the
    /// nonce) between attempts. Changing this would change every stored
    /// block hash.
    pub fn compute_hash(
        index: u64,
        timestamp: i64,
        previous_hash: &str,
        merkle_root: &str,
    ) -> String {
        let mut data = Vec::with_capacity(16 + previous_hash.len() + merkle_root.len());
        data.extend(index.to_be_bytes());
        data.extend(timestamp.to_be_bytes());
        data.extend(previous_hash.as_bytes());
        data.extend(merkle_root.as_bytes());
        sha256_hex(&data)
    }

    /// Recompute this block's header hash from its stored fields.
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.merkle_root,
        )
    }

    /// Proof-of-work condition: `difficulty` leading ASCII `'0'`
    /// characters in the hex hash.
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let required = difficulty as usize;
        hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
    }

    fn accounted_size(transactions: &[Transaction]) -> Result<u32> {
        let mut size = BLOCK_HEADER_BYTES;
        for tx in transactions {
            size = size.saturating_add(tx.byte_size()?);
        }
        Ok(size)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn merkle_root(&self) -> &str {
        &self.merkle_root
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}
