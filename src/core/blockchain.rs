use crate::core::{Block, GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
use crate::error::{ChainError, NodeError, Result};
use log::info;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory append-only ledger of blocks.
///
/// Append is mutually exclusive with itself and re-validates linkage
/// against the tip under the write lock, so a build racing a peer sync
/// cannot land two blocks at the same height. Reads work on snapshots.
#[derive(Clone)]
pub struct Blockchain {
    blocks: Arc<RwLock<Vec<Block>>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Blockchain {
        Blockchain {
            blocks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Rebuild a chain from stored blocks, e.g. at startup. Blocks must
    /// already be in index order.
    pub fn from_blocks(blocks: Vec<Block>) -> Blockchain {
        Blockchain {
            blocks: Arc::new(RwLock::new(blocks)),
        }
    }

    /// Append a block after checking it links to the current tip. A stale
    /// candidate (mined against an outdated tip) is rejected with
    /// `LinkMismatch` and the chain is left untouched.
    pub fn append(&self, block: Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| NodeError::Storage("chain lock poisoned".to_string()))?;

        match blocks.last() {
            Some(tip) => {
                if block.index() != tip.index() + 1 {
                    return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                        "expected index {}, got {}",
                        tip.index() + 1,
                        block.index()
                    ))));
                }
                if block.previous_hash() != tip.hash() {
                    return Err(NodeError::Chain(ChainError::LinkMismatch(format!(
                        "previous hash {} does not match tip {}",
                        block.previous_hash(),
                        tip.hash()
                    ))));
                }
            }
            None => {
                if block.previous_hash() != GENESIS_PREVIOUS_HASH {
                    return Err(NodeError::Chain(ChainError::GenesisInvalid(format!(
                        "first block must reference previous hash {GENESIS_PREVIOUS_HASH}"
                    ))));
                }
                if block.index() != GENESIS_INDEX {
                    return Err(NodeError::Chain(ChainError::GenesisInvalid(format!(
                        "first block must carry index {GENESIS_INDEX}, got {}",
                        block.index()
                    ))));
                }
            }
        }

        info!(
            "Appending block {} at height {} ({} transactions)",
            block.hash(),
            block.index(),
            block.transactions().len()
        );
        blocks.push(block);
        Ok(())
    }

    /// Swap in a remote chain accepted during reconciliation.
    pub fn replace(&self, new_blocks: Vec<Block>) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| NodeError::Storage("chain lock poisoned".to_string()))?;
        info!(
            "Replacing local chain of {} blocks with remote chain of {}",
            blocks.len(),
            new_blocks.len()
        );
        *blocks = new_blocks;
        Ok(())
    }

    pub fn tip(&self) -> Option<Block> {
        self.read().last().cloned()
    }

    pub fn last_block_hash(&self) -> Option<String> {
        self.read().last().map(|b| b.hash().to_string())
    }

    pub fn height(&self) -> u64 {
        self.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of all blocks, oldest first.
    pub fn blocks(&self) -> Vec<Block> {
        self.read().clone()
    }

    /// Whether any block contains the given transaction id.
    pub fn contains_transaction(&self, id: &Uuid) -> bool {
        self.read()
            .iter()
            .any(|block| block.transactions().iter().any(|tx| tx.id() == *id))
    }

    /// Confirmed balance: incoming transfers minus outgoing transfers and
    /// their fees, scanning every block. O(total transaction count), the
    /// accepted cost of having no account index.
    pub fn balance_of(&self, address: &str) -> u64 {
        let mut incoming: u64 = 0;
        let mut outgoing: u64 = 0;
        for block in self.read().iter() {
            for tx in block.transactions() {
                if tx.receiver() == address {
                    incoming = incoming.saturating_add(tx.amount());
                }
                if tx.sender() == address {
                    outgoing = outgoing
                        .saturating_add(tx.amount())
                        .saturating_add(tx.fee());
                }
            }
        }
        incoming.saturating_sub(outgoing)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Block>> {
        self.blocks
            .read()
            .expect("chain lock poisoned - this should never happen")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::test_block;
    use crate::core::Transaction;
    use crate::wallet::Wallet;

    #[test]
    fn test_append_links_blocks() {
        let chain = Blockchain::new();
        let genesis = test_block(GENESIS_INDEX, GENESIS_PREVIOUS_HASH, Vec::new());
        let genesis_hash = genesis.hash().to_string();
        chain.append(genesis).unwrap();

        let next = test_block(GENESIS_INDEX + 1, &genesis_hash, Vec::new());
        chain.append(next).unwrap();

        assert_eq!(chain.height(), 2);
        let blocks = chain.blocks();
        assert_eq!(blocks[1].previous_hash(), blocks[0].hash());
        assert_eq!(blocks[1].index(), blocks[0].index() + 1);
    }

    #[test]
    fn test_append_rejects_stale_tip() {
        let chain = Blockchain::new();
        let genesis = test_block(GENESIS_INDEX, GENESIS_PREVIOUS_HASH, Vec::new());
        let genesis_hash = genesis.hash().to_string();
        chain.append(genesis).unwrap();
        chain
            .append(test_block(GENESIS_INDEX + 1, &genesis_hash, Vec::new()))
            .unwrap();

        // Candidate still linked to genesis: stale after the second append
        let stale = test_block(GENESIS_INDEX + 1, &genesis_hash, Vec::new());
        let result = chain.append(stale);
        assert!(matches!(
            result,
            Err(NodeError::Chain(ChainError::LinkMismatch(_)))
        ));
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn test_append_rejects_bad_genesis() {
        let chain = Blockchain::new();
        let wrong = test_block(GENESIS_INDEX, "not-the-sentinel", Vec::new());
        assert!(matches!(
            chain.append(wrong),
            Err(NodeError::Chain(ChainError::GenesisInvalid(_)))
        ));
    }

    #[test]
    fn test_balance_accounting() {
        let sender_wallet = Wallet::new().unwrap();
        let funder_wallet = Wallet::new().unwrap();
        let sender = sender_wallet.address();

        // Fund the sender with 100, then spend 10 with fee 1
        let funding = Transaction::new(&funder_wallet, &sender, 100, 0, None).unwrap();
        let spend = Transaction::new(&sender_wallet, "receiver-addr", 10, 1, None).unwrap();

        let chain = Blockchain::new();
        let genesis = test_block(GENESIS_INDEX, GENESIS_PREVIOUS_HASH, Vec::new());
        let genesis_hash = genesis.hash().to_string();
        chain.append(genesis).unwrap();
        let funding_block = test_block(GENESIS_INDEX + 1, &genesis_hash, vec![funding]);
        let funding_hash = funding_block.hash().to_string();
        chain.append(funding_block).unwrap();
        chain
            .append(test_block(GENESIS_INDEX + 2, &funding_hash, vec![spend]))
            .unwrap();

        assert_eq!(chain.balance_of(&sender), 100 - 10 - 1);
        assert_eq!(chain.balance_of("receiver-addr"), 10);
    }

    #[test]
    fn test_contains_transaction() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new(&wallet, "receiver-addr", 5, 0, None).unwrap();
        let tx_id = tx.id();

        let chain = Blockchain::new();
        let genesis = test_block(GENESIS_INDEX, GENESIS_PREVIOUS_HASH, vec![tx]);
        chain.append(genesis).unwrap();

        assert!(chain.contains_transaction(&tx_id));
        assert!(!chain.contains_transaction(&Uuid::new_v4()));
    }
}
