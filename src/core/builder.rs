use crate::core::{
    Block, Blockchain, MerkleTree, Transaction, TransactionPool, GENESIS_INDEX,
    GENESIS_PREVIOUS_HASH,
};
use crate::error::{ChainError, NodeError, Result};
use crate::utils::current_timestamp;
use crate::wallet::Wallet;
use log::{info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Pool occupancy that triggers a build
    pub max_tx_per_block: usize,
    /// Build anyway once this much time has passed since the last block
    pub build_wait: Duration,
    pub difficulty: u32,
    pub genesis_difficulty: u32,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_tx_per_block: 1,
            build_wait: Duration::from_secs(60),
            difficulty: 2,
            genesis_difficulty: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Idle,
    Collecting,
    Mining,
    Finalized,
}

/// Assembles blocks from the pool and mines them.
///
/// Only one build runs at a time (atomic re-entry guard). The chain tip
/// is read immediately before mining and checked again by the append; a
/// candidate mined against a tip that moved is discarded and its
/// transactions go back to the pool.
pub struct BlockBuilder {
    chain: Blockchain,
    pool: Arc<TransactionPool>,
    identity: Arc<Wallet>,
    config: BuilderConfig,
    in_flight: AtomicBool,
    cancelled: Arc<AtomicBool>,
    last_build: Mutex<Instant>,
    state: Mutex<BuilderState>,
}

impl BlockBuilder {
    pub fn new(
        chain: Blockchain,
        pool: Arc<TransactionPool>,
        identity: Arc<Wallet>,
        config: BuilderConfig,
    ) -> BlockBuilder {
        BlockBuilder {
            chain,
            pool,
            identity,
            config,
            in_flight: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            last_build: Mutex::new(Instant::now()),
            state: Mutex::new(BuilderState::Idle),
        }
    }

    /// Handle for cooperative shutdown: mining checks this every attempt.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn state(&self) -> BuilderState {
        *self
            .state
            .lock()
            .expect("builder state lock poisoned - this should never happen")
    }

    /// One build attempt. Returns `Ok(None)` when there is nothing to do:
    /// the trigger condition is not met, a build is already in flight, or
    /// mining was cancelled.
    pub fn try_build(&self) -> Result<Option<Block>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }

        let result = self.build_once();
        self.set_state(BuilderState::Idle);
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn build_once(&self) -> Result<Option<Block>> {
        if self.chain.is_empty() {
            return self.build_genesis();
        }

        let due = {
            let last = self
                .last_build
                .lock()
                .expect("builder clock lock poisoned - this should never happen");
            last.elapsed() >= self.config.build_wait
        };
        if self.pool.count() < self.config.max_tx_per_block && !due {
            return Ok(None);
        }

        self.set_state(BuilderState::Collecting);
        let transactions = self.collect();
        if transactions.is_empty() {
            // Timer fired with an empty pool: nothing worth a block
            self.set_state(BuilderState::Idle);
            return Ok(None);
        }

        match self.assemble(&transactions) {
            Ok(Some(block)) => {
                self.touch_build_clock();
                Ok(Some(block))
            }
            Ok(None) => {
                self.restore(transactions);
                Ok(None)
            }
            Err(e) => {
                // The whole candidate aborts; nothing partial reaches the
                // chain and the drained transactions go back to the pool.
                warn!("Block build aborted: {e}");
                self.restore(transactions);
                Err(e)
            }
        }
    }

    fn build_genesis(&self) -> Result<Option<Block>> {
        self.set_state(BuilderState::Mining);
        info!("Chain is empty, minting genesis block");

        let merkle_root = MerkleTree::calculate_root(&[])?;
        let mined = self.mine(
            GENESIS_INDEX,
            GENESIS_PREVIOUS_HASH,
            &merkle_root,
            self.config.genesis_difficulty,
            0,
        )?;
        let Some((timestamp, nonce, hash)) = mined else {
            return Ok(None);
        };

        let signature = self.identity.sign(hash.as_bytes())?;
        let block = Block::from_parts(
            Uuid::new_v4(),
            GENESIS_INDEX,
            timestamp,
            Vec::new(),
            merkle_root,
            GENESIS_PREVIOUS_HASH.to_string(),
            hash,
            self.config.genesis_difficulty,
            nonce,
            signature,
        )?;

        self.set_state(BuilderState::Finalized);
        self.chain.append(block.clone())?;
        self.touch_build_clock();
        info!("Genesis block {} appended", block.hash());
        Ok(Some(block))
    }

    /// Drain up to the configured number of highest-fee transactions.
    fn collect(&self) -> Vec<Transaction> {
        let mut transactions = Vec::with_capacity(self.config.max_tx_per_block);
        while transactions.len() < self.config.max_tx_per_block {
            match self.pool.take_highest_fee() {
                Some(tx) => transactions.push(tx),
                None => break,
            }
        }
        transactions
    }

    fn assemble(&self, transactions: &[Transaction]) -> Result<Option<Block>> {
        // Tip snapshot taken right before mining; append re-checks it
        let tip = self.chain.tip().ok_or_else(|| {
            NodeError::Chain(ChainError::LinkMismatch(
                "chain emptied during build".to_string(),
            ))
        })?;
        let index = tip.index() + 1;
        let previous_hash = tip.hash().to_string();

        let merkle_root = MerkleTree::calculate_root(transactions)?;

        self.set_state(BuilderState::Mining);
        let Some((timestamp, nonce, hash)) = self.mine(
            index,
            &previous_hash,
            &merkle_root,
            self.config.difficulty,
            tip.timestamp(),
        )?
        else {
            return Ok(None);
        };

        let signature = self.identity.sign(hash.as_bytes())?;
        let mut confirmed = transactions.to_vec();
        for tx in &mut confirmed {
            tx.mark_confirmed();
        }

        let block = Block::from_parts(
            Uuid::new_v4(),
            index,
            timestamp,
            confirmed,
            merkle_root,
            previous_hash,
            hash,
            self.config.difficulty,
            nonce,
            signature,
        )?;

        self.set_state(BuilderState::Finalized);
        self.chain.append(block.clone())?;
        info!(
            "Mined block {} at height {} with {} transactions",
            block.hash(),
            block.index(),
            block.transactions().len()
        );
        Ok(Some(block))
    }

    /// Brute-force search: every attempt refreshes the timestamp and
    /// draws a new nonce, because the hash preimage carries the timestamp
    /// but not the nonce. Unbounded unless cancelled. Attempts whose
    /// timestamp has not passed `floor_timestamp` (the tip's) are skipped
    /// so the link invariant of strictly increasing timestamps holds.
    fn mine(
        &self,
        index: u64,
        previous_hash: &str,
        merkle_root: &str,
        difficulty: u32,
        floor_timestamp: i64,
    ) -> Result<Option<(i64, String, String)>> {
        let mut rng = rand::thread_rng();
        let mut attempts: u64 = 0;
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                info!("Mining cancelled after {attempts} attempts");
                return Ok(None);
            }

            let timestamp = current_timestamp()?;
            if timestamp <= floor_timestamp {
                continue;
            }
            let nonce = format!("{}-{}", timestamp, rng.gen::<u64>());
            let hash = Block::compute_hash(index, timestamp, previous_hash, merkle_root);
            attempts += 1;

            if Block::meets_difficulty(&hash, difficulty) {
                info!("Found hash {hash} after {attempts} attempts (difficulty {difficulty})");
                return Ok(Some((timestamp, nonce, hash)));
            }
        }
    }

    fn restore(&self, transactions: Vec<Transaction>) {
        for tx in transactions {
            if !self.pool.add(tx) {
                warn!("Could not restore transaction to pool after aborted build");
            }
        }
    }

    fn touch_build_clock(&self) {
        let mut last = self
            .last_build
            .lock()
            .expect("builder clock lock poisoned - this should never happen");
        *last = Instant::now();
    }

    fn set_state(&self, next: BuilderState) {
        let mut state = self
            .state
            .lock()
            .expect("builder state lock poisoned - this should never happen");
        *state = next;
    }
}
