mod message;
mod peer;
mod server;
pub mod session;
mod sync;

pub use message::{
    read_envelope, write_envelope, ChainSummary, EncryptedBlob, Envelope, MessagePayload, Method,
    PROTOCOL_VERSION,
};
pub use peer::{peer_from_record, peer_record, Peer, PeerRegistry, PeerStatus};
pub use server::{submit_transaction, Server};
pub use session::{
    require_session, Handshake, InMemorySessionStore, SecureChannel, SessionKey, SessionKeyStore,
    SESSION_KEY_LEN,
};
pub use sync::{SyncConfig, SyncEngine};
