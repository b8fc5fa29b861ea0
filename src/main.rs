use clap::Parser;
use log::{error, warn, LevelFilter};
use peerledger::network::{peer_from_record, peer_record};
use peerledger::wallet::{identity_from_record, identity_record, IDENTITY_RECORD_ID};
use peerledger::{
    load_chain, open_identity, seal_identity, submit_transaction, BlockBuilder, Blockchain,
    ChainValidator, Command, EntityKind, InMemorySessionStore, NodeError, Opt, Peer, PeerRegistry,
    RecordStore, Server, Settings, SledStore, SyncEngine, Transaction, TransactionPool, Wallet,
    GENESIS_INDEX,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load(opt.config.as_deref())?;

    match opt.command {
        Command::Init { passphrase } => {
            let store = SledStore::open(&settings.data_dir)?;
            if store.get(EntityKind::Identity, IDENTITY_RECORD_ID)?.is_some() {
                return Err("identity already exists; delete the data directory to start over"
                    .to_string()
                    .into());
            }

            let wallet = Wallet::new()?;
            let node_id = Uuid::new_v4();
            let sealed = seal_identity(node_id, &wallet, &passphrase)?;
            store.add(identity_record(&sealed)?)?;

            println!("Node id: {node_id}");
            println!("Address: {}", wallet.address());
        }
        Command::Start { passphrase } => {
            let store: Arc<dyn RecordStore> = Arc::new(SledStore::open(&settings.data_dir)?);
            let sealed = load_identity(store.as_ref())?;
            let wallet = open_identity(&sealed, &passphrase)?;
            let node_id = sealed.node_id;

            let chain = Blockchain::from_blocks(load_chain(store.as_ref())?);
            let pool = Arc::new(TransactionPool::new());
            let sessions = Arc::new(InMemorySessionStore::new());

            if settings.expected_genesis_index != GENESIS_INDEX {
                warn!(
                    "Genesis index expectation ({}) differs from the index minted by the \
                     builder ({GENESIS_INDEX}); locally minted chains will fail full \
                     validation until expected_genesis_index is aligned",
                    settings.expected_genesis_index
                );
            }
            let validator = Arc::new(ChainValidator::new(settings.validator_config()));

            let registry = Arc::new(PeerRegistry::new());
            for endpoint in &settings.peers {
                match Peer::from_endpoint(endpoint) {
                    Ok(peer) => registry.register(peer),
                    Err(e) => warn!("Skipping peer {endpoint}: {e}"),
                }
            }
            for record in store.get_all(EntityKind::Peer)? {
                match peer_from_record(&record) {
                    Ok(peer) => registry.register(peer),
                    Err(e) => warn!("Skipping stored peer record {}: {e}", record.id),
                }
            }
            for peer in registry.peers() {
                // Best effort: remember configured peers across restarts
                let _ = peer_record(&peer).and_then(|r| store.add(r));
            }

            let builder = Arc::new(BlockBuilder::new(
                chain.clone(),
                Arc::clone(&pool),
                Arc::new(wallet),
                settings.builder_config(),
            ));
            let engine = Arc::new(SyncEngine::new(
                node_id,
                chain,
                pool,
                validator,
                sessions,
                Arc::clone(&store),
                settings.sync_config(),
            ));

            let server = Server::new(
                engine,
                builder,
                registry,
                store,
                Duration::from_secs(settings.build_interval_secs),
                Duration::from_secs(settings.sync_interval_secs),
            );
            server.run(&settings.listen_addr)?;
        }
        Command::Send {
            to,
            amount,
            fee,
            passphrase,
            node,
        } => {
            let store = SledStore::open(&settings.data_dir)?;
            let sealed = load_identity(&store)?;
            let wallet = open_identity(&sealed, &passphrase)?;

            let tx = Transaction::new(&wallet, &to, amount, fee, None)?;
            let target = node.unwrap_or_else(|| settings.listen_addr.clone());
            submit_transaction(&target, &tx)?;
            println!("Submitted transaction {}", tx.id());
        }
        Command::Balance { address } => {
            let store = SledStore::open(&settings.data_dir)?;
            let address = match address {
                Some(address) => address,
                None => load_identity(&store)?.address,
            };
            let chain = Blockchain::from_blocks(load_chain(&store)?);
            println!("Balance of {address}: {}", chain.balance_of(&address));
        }
        Command::PrintChain => {
            let store = SledStore::open(&settings.data_dir)?;
            for block in load_chain(&store)? {
                println!("Block {} (height {})", block.hash(), block.index());
                println!("  previous: {}", block.previous_hash());
                println!("  merkle root: {}", block.merkle_root());
                println!("  timestamp: {}", block.timestamp());
                println!(
                    "  difficulty: {}  nonce: {}  size: {} bytes",
                    block.difficulty(),
                    block.nonce(),
                    block.size_bytes()
                );
                for tx in block.transactions() {
                    println!(
                        "  - tx {}: {} -> {} amount {} fee {}",
                        tx.id(),
                        tx.sender(),
                        tx.receiver(),
                        tx.amount(),
                        tx.fee()
                    );
                }
                println!();
            }
        }
        Command::Peers => {
            let store = SledStore::open(&settings.data_dir)?;
            for endpoint in &settings.peers {
                println!("{endpoint} (configured)");
            }
            for record in store.get_all(EntityKind::Peer)? {
                if let Ok(peer) = peer_from_record(&record) {
                    println!(
                        "{} node_id={} status={:?} last_seen={}",
                        peer.endpoint(),
                        peer.node_id,
                        peer.status,
                        peer.last_seen
                    );
                }
            }
        }
    }
    Ok(())
}

fn load_identity(store: &dyn RecordStore) -> Result<peerledger::wallet::EncryptedIdentity, NodeError> {
    let record = store
        .get(EntityKind::Identity, IDENTITY_RECORD_ID)?
        .ok_or_else(|| NodeError::Config("no identity found; run `init` first".to_string()))?;
    identity_from_record(&record)
}
