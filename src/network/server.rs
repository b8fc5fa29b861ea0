use crate::core::{BlockBuilder, Transaction};
use crate::error::{NodeError, Result, SyncError};
use crate::network::message::{
    read_envelope, write_envelope, EncryptedBlob, Envelope, MessagePayload, Method,
};
use crate::network::peer::PeerRegistry;
use crate::network::session::{Handshake, SecureChannel};
use crate::network::sync::SyncEngine;
use crate::storage::{save_block, EntityKind, RecordStore};
use log::{debug, error, info, warn};
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// P2P server: accepts peer connections, runs the periodic block build,
/// and drives outbound reconciliation loops against the configured peers.
pub struct Server {
    engine: Arc<SyncEngine>,
    builder: Arc<BlockBuilder>,
    registry: Arc<PeerRegistry>,
    store: Arc<dyn RecordStore>,
    build_interval: Duration,
    reconnect_interval: Duration,
}

impl Server {
    pub fn new(
        engine: Arc<SyncEngine>,
        builder: Arc<BlockBuilder>,
        registry: Arc<PeerRegistry>,
        store: Arc<dyn RecordStore>,
        build_interval: Duration,
        reconnect_interval: Duration,
    ) -> Server {
        Server {
            engine,
            builder,
            registry,
            store,
            build_interval,
            reconnect_interval,
        }
    }

    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| NodeError::Io(format!("failed to bind to {addr}: {e}")))?;
        info!("Node listening on {addr}");

        // Mint and persist genesis up front so sync rounds always see a
        // validatable chain.
        self.build_tick();

        self.start_build_timer();
        self.start_peer_loops();

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };
                    let engine = Arc::clone(&self.engine);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&engine, stream, peer_addr) {
                            warn!("Connection with {peer_addr} ended: {e}");
                        }
                    });
                }
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }

        Ok(())
    }

    /// Periodic build attempts on a dedicated thread; mining never runs
    /// on the accept loop.
    fn start_build_timer(&self) {
        let builder = Arc::clone(&self.builder);
        let store = Arc::clone(&self.store);
        let interval = self.build_interval;

        thread::spawn(move || loop {
            thread::sleep(interval);
            Self::build_once(&builder, &store);
        });
    }

    fn build_tick(&self) {
        Self::build_once(&self.builder, &self.store);
    }

    fn build_once(builder: &BlockBuilder, store: &Arc<dyn RecordStore>) {
        match builder.try_build() {
            Ok(Some(block)) => {
                if let Err(e) = save_block(store.as_ref(), &block) {
                    error!("Failed to persist block {}: {e}", block.hash());
                }
                // Confirmed transactions no longer belong to the pool's
                // persisted backlog
                for tx in block.transactions() {
                    let _ = store.delete(EntityKind::Transaction, &tx.id().to_string());
                }
            }
            Ok(None) => {}
            // Mining never fails terminally: log and wait for the next tick
            Err(e) => warn!("Block build failed, deferring to next tick: {e}"),
        }
    }

    /// One reconnecting reconciliation loop per configured peer.
    fn start_peer_loops(&self) {
        for peer in self.registry.peers() {
            let engine = Arc::clone(&self.engine);
            let registry = Arc::clone(&self.registry);
            let interval = self.reconnect_interval;

            thread::spawn(move || loop {
                engine.touch_peer(&registry, &peer.node_id);
                match engine.run_peer(&peer) {
                    Ok(()) => info!("Sync loop with {} finished", peer.endpoint()),
                    Err(e) => debug!("Sync with {} unavailable: {e}", peer.endpoint()),
                }
                registry.mark_inactive(&peer.node_id);
                thread::sleep(interval);
            });
        }
    }

    fn handle_connection(
        engine: &SyncEngine,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream.try_clone()?;

        loop {
            match read_envelope(&mut reader) {
                Ok(None) => break,
                Ok(Some(envelope)) => {
                    debug!(
                        "Received {} {:?} from {peer_addr}",
                        envelope.payload.message_type(),
                        envelope.method
                    );
                    match engine.handle_envelope(&envelope) {
                        Ok(responses) => {
                            for response in responses {
                                write_envelope(&mut writer, &response)?;
                            }
                        }
                        // A crypto or cipher failure aborts this peer's
                        // session; local state is untouched.
                        Err(e) => {
                            error!("Aborting session with {peer_addr}: {e}");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("Dropping connection from {peer_addr}: {e}");
                    break;
                }
            }
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }
}

/// Hand a locally created transaction to a running node: handshake for a
/// session key, then push the transaction encrypted.
pub fn submit_transaction(addr: &str, tx: &Transaction) -> Result<()> {
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| NodeError::Sync(SyncError::PeerUnreachable(format!("{addr}: {e}"))))?;
    let stream = TcpStream::connect_timeout(&socket_addr, SUBMIT_TIMEOUT)
        .map_err(|e| NodeError::Sync(SyncError::PeerUnreachable(format!("{addr}: {e}"))))?;
    stream.set_read_timeout(Some(SUBMIT_TIMEOUT))?;
    stream.set_write_timeout(Some(SUBMIT_TIMEOUT))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let client_id = Uuid::new_v4();

    let handshake = Handshake::begin()?;
    write_envelope(
        &mut writer,
        &Envelope::new(
            client_id,
            None,
            Method::Request,
            MessagePayload::KeyExchange {
                public_key: handshake.public_key().to_vec(),
            },
        ),
    )?;
    let reply = read_envelope(&mut reader)?.ok_or_else(|| {
        NodeError::Sync(SyncError::PeerUnreachable("connection closed".to_string()))
    })?;
    let MessagePayload::KeyExchange { public_key } = reply.payload else {
        return Err(NodeError::Sync(SyncError::ReconciliationFailure(
            "unexpected handshake reply".to_string(),
        )));
    };
    let key = handshake.complete(&public_key)?;
    let channel = SecureChannel::new(&key)?;

    let body = serde_json::to_vec(&vec![tx.clone()])?;
    write_envelope(
        &mut writer,
        &Envelope::new(
            client_id,
            Some(reply.sender_id),
            Method::Push,
            MessagePayload::Transaction(EncryptedBlob(channel.encrypt(&body)?)),
        ),
    )?;
    info!("Submitted transaction {} to {addr}", tx.id());
    Ok(())
}
