//! Peer synchronization.
//!
//! Each outbound connection walks `Connect → KeyExchange → InfoExchange →
//! Reconcile{Transactions, Blocks}` and then polls on a fixed interval
//! until the connection drops. Inbound traffic is served by
//! [`SyncEngine::handle_envelope`], which the server calls per message.

use crate::core::{
    Block, Blockchain, ChainValidation, Transaction, TransactionPool, TransactionValidator,
};
use crate::error::{NodeError, Result, SyncError};
use crate::network::message::{
    read_envelope, write_envelope, ChainSummary, EncryptedBlob, Envelope, MessagePayload, Method,
};
use crate::network::peer::Peer;
use crate::network::session::{require_session, Handshake, SecureChannel, SessionKeyStore};
use crate::storage::{block_record, transaction_record, EntityKind, RecordStore};
use crate::utils::current_timestamp;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause between reconciliation rounds on an open connection
    pub poll_interval: Duration,
    /// Bounded wait for a response the round depends on
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub session_ttl: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            session_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

/// Reconciles local chain and pool state with peers.
pub struct SyncEngine {
    node_id: Uuid,
    chain: Blockchain,
    pool: Arc<TransactionPool>,
    validator: Arc<dyn ChainValidation>,
    sessions: Arc<dyn SessionKeyStore>,
    store: Arc<dyn RecordStore>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        node_id: Uuid,
        chain: Blockchain,
        pool: Arc<TransactionPool>,
        validator: Arc<dyn ChainValidation>,
        sessions: Arc<dyn SessionKeyStore>,
        store: Arc<dyn RecordStore>,
        config: SyncConfig,
    ) -> SyncEngine {
        SyncEngine {
            node_id,
            chain,
            pool,
            validator,
            sessions,
            store,
            config,
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Local chain and pool summary for the info exchange.
    pub fn build_summary(&self) -> ChainSummary {
        ChainSummary {
            blocks_count: self.chain.height(),
            last_block_hash: self.chain.last_block_hash().unwrap_or_default(),
            last_block_timestamp: self.chain.tip().map(|b| b.timestamp()).unwrap_or(0),
            transactions_count: self.pool.count() as u64,
            transaction_ids: self.pool.transaction_ids(),
        }
    }

    /// Pooled transactions the remote does not know about. Pushing only
    /// happens while the remote's advertised id set is no larger than the
    /// local block count; beyond that the remote is treated as caught up.
    pub fn plan_transaction_push(&self, remote: &ChainSummary) -> Vec<Transaction> {
        if remote.transaction_ids.len() as u64 > self.chain.height() {
            return Vec::new();
        }
        let remote_ids: HashSet<Uuid> = remote.transaction_ids.iter().copied().collect();
        self.pool
            .transaction_ids()
            .into_iter()
            .filter(|id| !remote_ids.contains(id))
            .filter_map(|id| self.pool.get(&id))
            .collect()
    }

    /// Decide whether to pull the remote's blocks: only on a tip-hash
    /// mismatch, and only after the local chain passes full validation.
    pub fn should_request_blocks(&self, remote: &ChainSummary) -> Result<bool> {
        let local_hash = self.chain.last_block_hash().unwrap_or_default();
        if local_hash == remote.last_block_hash {
            return Ok(false);
        }
        if !self.validator.validate_chain(&self.chain.blocks()) {
            return Err(NodeError::Sync(SyncError::ReconciliationFailure(
                "local chain failed validation, refusing to reconcile".to_string(),
            )));
        }
        Ok(true)
    }

    /// Admit transactions pushed by a peer: each one runs the full
    /// admission validation; rejects are logged and skipped.
    pub fn apply_transactions(&self, transactions: Vec<Transaction>) -> usize {
        let validator = TransactionValidator::new(self.chain.clone());
        let mut admitted = 0;
        for tx in transactions {
            if self.chain.contains_transaction(&tx.id()) {
                debug!("Skipping already-confirmed transaction {}", tx.id());
                continue;
            }
            match validator.validate(&tx) {
                Ok(()) => {
                    let record = transaction_record(&tx);
                    if self.pool.add(tx) {
                        if let Ok(record) = record {
                            let _ = self.store.add(record);
                        }
                        admitted += 1;
                    }
                }
                Err(e) => warn!("Rejecting peer transaction: {e}"),
            }
        }
        admitted
    }

    /// Adopt a remote chain when it is longer than ours and fully valid.
    /// Confirmed transactions leave the pool and the stored chain is
    /// rewritten.
    pub fn apply_blocks(&self, blocks: Vec<Block>) -> Result<bool> {
        if blocks.len() as u64 <= self.chain.height() {
            debug!(
                "Ignoring remote chain of {} blocks, local height {}",
                blocks.len(),
                self.chain.height()
            );
            return Ok(false);
        }
        if !self.validator.validate_chain(&blocks) {
            return Err(NodeError::Sync(SyncError::ReconciliationFailure(
                "remote chain failed validation".to_string(),
            )));
        }

        self.chain.replace(blocks.clone())?;
        for block in &blocks {
            for tx in block.transactions() {
                self.pool.remove(&tx.id());
                let _ = self
                    .store
                    .delete(EntityKind::Transaction, &tx.id().to_string());
            }
        }
        self.persist_chain(&blocks)?;
        info!("Adopted remote chain at height {}", blocks.len());
        Ok(true)
    }

    fn persist_chain(&self, blocks: &[Block]) -> Result<()> {
        for record in self.store.get_all(EntityKind::Block)? {
            self.store.delete(EntityKind::Block, &record.id)?;
        }
        for block in blocks {
            self.store.add(block_record(block)?)?;
        }
        Ok(())
    }

    /// Serialize and session-encrypt a payload for a peer.
    fn seal<T: Serialize>(&self, peer_id: &Uuid, value: &T) -> Result<EncryptedBlob> {
        let key = require_session(self.sessions.as_ref(), peer_id)?;
        let channel = SecureChannel::new(&key)?;
        Ok(EncryptedBlob(channel.encrypt(&serde_json::to_vec(value)?)?))
    }

    /// Decrypt and deserialize a peer payload.
    fn open<T: DeserializeOwned>(&self, peer_id: &Uuid, blob: &EncryptedBlob) -> Result<T> {
        let key = require_session(self.sessions.as_ref(), peer_id)?;
        let channel = SecureChannel::new(&key)?;
        Ok(serde_json::from_slice(&channel.decrypt(&blob.0)?)?)
    }

    /// Serve one inbound envelope, returning any responses to write back.
    /// Matched exhaustively over the message kinds.
    pub fn handle_envelope(&self, envelope: &Envelope) -> Result<Vec<Envelope>> {
        let peer_id = envelope.sender_id;
        match (envelope.method, &envelope.payload) {
            (Method::Request, MessagePayload::KeyExchange { public_key }) => {
                let handshake = Handshake::begin()?;
                let our_public = handshake.public_key().to_vec();
                let key = handshake.complete(public_key)?;
                self.sessions.set(peer_id, key, self.config.session_ttl)?;
                info!("Session established with peer {peer_id}");
                Ok(vec![Envelope::new(
                    self.node_id,
                    Some(peer_id),
                    Method::Push,
                    MessagePayload::KeyExchange {
                        public_key: our_public,
                    },
                )])
            }
            (Method::Request, MessagePayload::InfoSync(remote)) => {
                let mut responses = vec![Envelope::new(
                    self.node_id,
                    Some(peer_id),
                    Method::Push,
                    MessagePayload::InfoSync(self.build_summary()),
                )];
                let missing = self.plan_transaction_push(remote);
                if !missing.is_empty() {
                    responses.push(Envelope::new(
                        self.node_id,
                        Some(peer_id),
                        Method::Push,
                        MessagePayload::Transaction(self.seal(&peer_id, &missing)?),
                    ));
                }
                Ok(responses)
            }
            (Method::Request, MessagePayload::Block(_)) => {
                let blocks = self.chain.blocks();
                Ok(vec![Envelope::new(
                    self.node_id,
                    Some(peer_id),
                    Method::Push,
                    MessagePayload::Block(self.seal(&peer_id, &blocks)?),
                )])
            }
            (Method::Push, MessagePayload::Transaction(blob)) => {
                let transactions: Vec<Transaction> = self.open(&peer_id, blob)?;
                let admitted = self.apply_transactions(transactions);
                debug!("Admitted {admitted} transactions from peer {peer_id}");
                Ok(Vec::new())
            }
            (Method::Push, MessagePayload::Block(blob)) => {
                let blocks: Vec<Block> = self.open(&peer_id, blob)?;
                self.apply_blocks(blocks)?;
                Ok(Vec::new())
            }
            (Method::Push, MessagePayload::KeyExchange { .. })
            | (Method::Push, MessagePayload::InfoSync(_))
            | (Method::Request, MessagePayload::Transaction(_)) => {
                debug!(
                    "Ignoring {} {:?} from peer {peer_id}",
                    envelope.payload.message_type(),
                    envelope.method
                );
                Ok(Vec::new())
            }
        }
    }

    /// Outbound connection driver: handshake, then reconciliation rounds
    /// until the connection closes or a round fails.
    pub fn run_peer(&self, peer: &Peer) -> Result<()> {
        let addr = peer.socket_addr()?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|e| NodeError::Sync(SyncError::PeerUnreachable(format!("{addr}: {e}"))))?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.read_timeout))?;
        info!("Connected to peer at {addr}");
        self.drive(stream)
    }

    fn drive(&self, stream: TcpStream) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        // KeyExchange
        let handshake = Handshake::begin()?;
        write_envelope(
            &mut writer,
            &Envelope::new(
                self.node_id,
                None,
                Method::Request,
                MessagePayload::KeyExchange {
                    public_key: handshake.public_key().to_vec(),
                },
            ),
        )?;
        let reply = self.await_envelope(&mut reader, |env| {
            matches!(
                (env.method, &env.payload),
                (Method::Push, MessagePayload::KeyExchange { .. })
            )
        })?;
        let remote_id = reply.sender_id;
        let MessagePayload::KeyExchange { public_key } = reply.payload else {
            return Err(NodeError::Sync(SyncError::ReconciliationFailure(
                "unexpected handshake reply".to_string(),
            )));
        };
        let key = handshake.complete(&public_key)?;
        self.sessions.set(remote_id, key, self.config.session_ttl)?;
        info!("Session established with peer {remote_id}");

        loop {
            // InfoExchange
            write_envelope(
                &mut writer,
                &Envelope::new(
                    self.node_id,
                    Some(remote_id),
                    Method::Request,
                    MessagePayload::InfoSync(self.build_summary()),
                ),
            )?;
            let summary_env = self.await_envelope(&mut reader, |env| {
                matches!(
                    (env.method, &env.payload),
                    (Method::Push, MessagePayload::InfoSync(_))
                )
            })?;
            let MessagePayload::InfoSync(remote) = summary_env.payload else {
                return Err(NodeError::Sync(SyncError::ReconciliationFailure(
                    "unexpected info-sync reply".to_string(),
                )));
            };

            // Reconcile transactions
            let missing = self.plan_transaction_push(&remote);
            if !missing.is_empty() {
                info!(
                    "Pushing {} transactions to peer {remote_id}",
                    missing.len()
                );
                write_envelope(
                    &mut writer,
                    &Envelope::new(
                        self.node_id,
                        Some(remote_id),
                        Method::Push,
                        MessagePayload::Transaction(self.seal(&remote_id, &missing)?),
                    ),
                )?;
            }

            // Reconcile blocks
            if self.should_request_blocks(&remote)? {
                info!("Tip mismatch with peer {remote_id}, requesting full chain");
                write_envelope(
                    &mut writer,
                    &Envelope::new(
                        self.node_id,
                        Some(remote_id),
                        Method::Request,
                        MessagePayload::Block(EncryptedBlob(Vec::new())),
                    ),
                )?;
                let block_env = self.await_envelope(&mut reader, |env| {
                    matches!(
                        (env.method, &env.payload),
                        (Method::Push, MessagePayload::Block(_))
                    )
                })?;
                let MessagePayload::Block(blob) = block_env.payload else {
                    return Err(NodeError::Sync(SyncError::ReconciliationFailure(
                        "unexpected block reply".to_string(),
                    )));
                };
                let blocks: Vec<Block> = self.open(&remote_id, &blob)?;
                self.apply_blocks(blocks)?;
            }

            thread::sleep(self.config.poll_interval);
        }
    }

    /// Read until the awaited message arrives; anything else received in
    /// the meantime is consumed in place.
    fn await_envelope<R: BufRead>(
        &self,
        reader: &mut R,
        want: impl Fn(&Envelope) -> bool,
    ) -> Result<Envelope> {
        loop {
            match read_envelope(reader)? {
                None => {
                    return Err(NodeError::Sync(SyncError::PeerUnreachable(
                        "connection closed".to_string(),
                    )))
                }
                Some(envelope) if want(&envelope) => return Ok(envelope),
                Some(envelope) => {
                    // e.g. a transaction push arriving ahead of the reply
                    self.handle_envelope(&envelope)?;
                }
            }
        }
    }

    /// Record when a peer was last heard from.
    pub fn touch_peer(&self, registry: &crate::network::peer::PeerRegistry, node_id: &Uuid) {
        if let Ok(now) = current_timestamp() {
            registry.mark_active(node_id, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{chain_of, test_block, test_block_at};
    use crate::core::{ChainValidator, ValidatorConfig, GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
    use crate::network::session::InMemorySessionStore;
    use crate::storage::MemoryStore;
    use crate::wallet::Wallet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingValidator {
        calls: AtomicUsize,
        verdict: bool,
    }

    impl CountingValidator {
        fn new(verdict: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                verdict,
            }
        }
    }

    impl ChainValidation for CountingValidator {
        fn validate_chain(&self, _blocks: &[Block]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn engine_with(
        chain: Blockchain,
        validator: Arc<dyn ChainValidation>,
    ) -> (SyncEngine, Arc<TransactionPool>) {
        let pool = Arc::new(TransactionPool::new());
        let engine = SyncEngine::new(
            Uuid::new_v4(),
            chain,
            Arc::clone(&pool),
            validator,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(MemoryStore::new()),
            SyncConfig::default(),
        );
        (engine, pool)
    }

    fn summary_for(blocks: &[Block], transaction_ids: Vec<Uuid>) -> ChainSummary {
        ChainSummary {
            blocks_count: blocks.len() as u64,
            last_block_hash: blocks.last().map(|b| b.hash().to_string()).unwrap_or_default(),
            last_block_timestamp: blocks.last().map(|b| b.timestamp()).unwrap_or(0),
            transactions_count: transaction_ids.len() as u64,
            transaction_ids,
        }
    }

    #[test]
    fn test_matching_tips_skip_validation_and_request() {
        let blocks = chain_of(5);
        let chain = Blockchain::from_blocks(blocks.clone());
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, _) = engine_with(chain, Arc::clone(&validator) as Arc<dyn ChainValidation>);

        let remote = summary_for(&blocks, Vec::new());
        assert!(!engine.should_request_blocks(&remote).unwrap());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tip_mismatch_validates_exactly_once() {
        let local = chain_of(5);
        let chain = Blockchain::from_blocks(local);
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, _) = engine_with(chain, Arc::clone(&validator) as Arc<dyn ChainValidation>);

        // Same height, different tip hash (shifted timestamp)
        let mut divergent = chain_of(4);
        let (tip_hash, tip_timestamp) = {
            let tip = divergent.last().unwrap();
            (tip.hash().to_string(), tip.timestamp())
        };
        divergent.push(test_block_at(
            GENESIS_INDEX + 4,
            &tip_hash,
            Vec::new(),
            tip_timestamp + 999,
            None,
        ));
        let remote = summary_for(&divergent, Vec::new());

        assert!(engine.should_request_blocks(&remote).unwrap());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_local_chain_aborts_reconciliation() {
        let chain = Blockchain::from_blocks(chain_of(3));
        let validator = Arc::new(CountingValidator::new(false));
        let (engine, _) = engine_with(chain, Arc::clone(&validator) as Arc<dyn ChainValidation>);

        let remote = summary_for(&chain_of(4), Vec::new());
        assert!(matches!(
            engine.should_request_blocks(&remote),
            Err(NodeError::Sync(SyncError::ReconciliationFailure(_)))
        ));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transaction_push_planning() {
        let chain = Blockchain::from_blocks(chain_of(3));
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, pool) = engine_with(chain, validator as Arc<dyn ChainValidation>);

        let wallet = Wallet::new().unwrap();
        let known = Transaction::new(&wallet, "receiver-addr", 5, 1, None).unwrap();
        let unknown = Transaction::new(&wallet, "receiver-addr", 7, 2, None).unwrap();
        let unknown_id = unknown.id();
        pool.add(known.clone());
        pool.add(unknown);

        // Remote already knows `known`
        let remote = summary_for(&chain_of(3), vec![known.id()]);
        let planned = engine.plan_transaction_push(&remote);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].id(), unknown_id);
    }

    #[test]
    fn test_transaction_push_suppressed_for_caught_up_remote() {
        // Remote advertises more transaction ids than we have blocks
        let chain = Blockchain::from_blocks(chain_of(1));
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, pool) = engine_with(chain, validator as Arc<dyn ChainValidation>);

        let wallet = Wallet::new().unwrap();
        pool.add(Transaction::new(&wallet, "receiver-addr", 5, 1, None).unwrap());

        let remote = summary_for(&chain_of(1), vec![Uuid::new_v4(), Uuid::new_v4()]);
        assert!(engine.plan_transaction_push(&remote).is_empty());
    }

    #[test]
    fn test_apply_blocks_adopts_longer_valid_chain() {
        let chain = Blockchain::from_blocks(chain_of(2));
        let validator = Arc::new(ChainValidator::new(ValidatorConfig {
            expected_genesis_index: GENESIS_INDEX,
            ..ValidatorConfig::default()
        }));
        let (engine, _) = engine_with(chain.clone(), validator as Arc<dyn ChainValidation>);

        let remote_blocks = chain_of(4);
        assert!(engine.apply_blocks(remote_blocks.clone()).unwrap());
        assert_eq!(chain.height(), 4);
        assert_eq!(
            chain.last_block_hash().unwrap(),
            remote_blocks.last().unwrap().hash()
        );
    }

    #[test]
    fn test_apply_blocks_ignores_shorter_chain() {
        let chain = Blockchain::from_blocks(chain_of(4));
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, _) = engine_with(chain.clone(), Arc::clone(&validator) as Arc<dyn ChainValidation>);

        assert!(!engine.apply_blocks(chain_of(2)).unwrap());
        assert_eq!(chain.height(), 4);
        // Shorter chains are discarded without validating
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_apply_blocks_rejects_invalid_chain() {
        let chain = Blockchain::from_blocks(chain_of(2));
        let validator = Arc::new(CountingValidator::new(false));
        let (engine, _) = engine_with(chain.clone(), validator as Arc<dyn ChainValidation>);

        assert!(engine.apply_blocks(chain_of(4)).is_err());
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn test_apply_blocks_drops_confirmed_transactions_from_pool() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new(&wallet, "receiver-addr", 5, 1, None).unwrap();
        let tx_id = tx.id();

        let chain = Blockchain::new();
        let validator = Arc::new(ChainValidator::new(ValidatorConfig {
            expected_genesis_index: GENESIS_INDEX,
            ..ValidatorConfig::default()
        }));
        let (engine, pool) = engine_with(chain, validator as Arc<dyn ChainValidation>);
        pool.add(tx.clone());

        let genesis = test_block(GENESIS_INDEX, GENESIS_PREVIOUS_HASH, vec![tx]);
        let second = test_block(GENESIS_INDEX + 1, genesis.hash(), Vec::new());
        assert!(engine.apply_blocks(vec![genesis, second]).unwrap());
        assert!(!pool.contains(&tx_id));
    }

    #[test]
    fn test_handle_envelope_key_exchange_and_encrypted_round() {
        // Server-side engine
        let chain = Blockchain::from_blocks(chain_of(2));
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, _) = engine_with(chain, validator as Arc<dyn ChainValidation>);

        // Client side of the handshake
        let client_id = Uuid::new_v4();
        let handshake = Handshake::begin().unwrap();
        let request = Envelope::new(
            client_id,
            None,
            Method::Request,
            MessagePayload::KeyExchange {
                public_key: handshake.public_key().to_vec(),
            },
        );

        let responses = engine.handle_envelope(&request).unwrap();
        assert_eq!(responses.len(), 1);
        let MessagePayload::KeyExchange { public_key } = &responses[0].payload else {
            panic!("expected a key-exchange reply");
        };
        let client_key = handshake.complete(public_key).unwrap();

        // The client can now request the chain and decrypt the reply
        let block_request = Envelope::new(
            client_id,
            None,
            Method::Request,
            MessagePayload::Block(EncryptedBlob(Vec::new())),
        );
        let responses = engine.handle_envelope(&block_request).unwrap();
        assert_eq!(responses.len(), 1);
        let MessagePayload::Block(blob) = &responses[0].payload else {
            panic!("expected a block reply");
        };
        let channel = SecureChannel::new(&client_key).unwrap();
        let blocks: Vec<Block> = serde_json::from_slice(&channel.decrypt(&blob.0).unwrap()).unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_block_request_without_session_fails() {
        let chain = Blockchain::from_blocks(chain_of(1));
        let validator = Arc::new(CountingValidator::new(true));
        let (engine, _) = engine_with(chain, validator as Arc<dyn ChainValidation>);

        let request = Envelope::new(
            Uuid::new_v4(),
            None,
            Method::Request,
            MessagePayload::Block(EncryptedBlob(Vec::new())),
        );
        assert!(matches!(
            engine.handle_envelope(&request),
            Err(NodeError::Cipher(crate::error::CipherError::SessionNotFound(_)))
        ));
    }
}
